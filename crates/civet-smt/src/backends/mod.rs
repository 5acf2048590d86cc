pub mod fm;
pub mod smtlib_printer;
