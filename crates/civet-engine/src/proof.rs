//! Human-readable proof log of the transformation steps.
//!
//! The driver appends a section or headline before every store snapshot;
//! the CLI renders the collected log after the run. Events are mirrored to
//! `tracing` for live observation.

use std::fmt::Write;

#[derive(Clone, Debug, Default)]
pub struct ProofLog {
    lines: Vec<String>,
}

impl ProofLog {
    pub fn new() -> Self {
        ProofLog::default()
    }

    pub fn section(&mut self, title: &str) {
        tracing::info!(target: "civet::proof", "{title}");
        self.lines.push(String::new());
        self.lines.push(format!("### {title} ###"));
        self.lines.push(String::new());
    }

    pub fn headline(&mut self, text: &str) {
        tracing::debug!(target: "civet::proof", "{text}");
        self.lines.push(String::new());
        self.lines.push(text.to_string());
    }

    pub fn line(&mut self, text: impl Into<String>) {
        self.lines.push(text.into());
    }

    pub fn warning(&mut self, text: &str) {
        tracing::warn!(target: "civet::proof", "{text}");
        self.lines.push(format!("WARNING: {text}"));
    }

    /// Appends a multi-line block, indented one level.
    pub fn block(&mut self, block: &str) {
        for line in block.lines() {
            self.lines.push(format!("  {line}"));
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            let _ = writeln!(out, "{line}");
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sections_and_blocks_render_in_order() {
        let mut proof = ProofLog::new();
        proof.section("Pre-processing");
        proof.headline("Initial problem");
        proof.block("rule one\nrule two");
        proof.warning("partial result");
        let text = proof.render();
        let pre = text.find("Pre-processing").unwrap();
        let initial = text.find("Initial problem").unwrap();
        let warn = text.find("WARNING: partial result").unwrap();
        assert!(pre < initial && initial < warn);
        assert!(text.contains("  rule one"));
    }
}
