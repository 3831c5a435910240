use std::io::Write;

use anyhow::{Context, Result};
use futures::{Stream, StreamExt};

/// Tracks streamed answer text and works out what still needs printing.
///
/// Providers either send pure deltas (only the new text) or cumulative
/// snapshots (all text so far). A fragment that starts with everything
/// printed so far is taken as a snapshot and only its suffix is new;
/// anything else is appended as a delta. A real delta that happens to extend
/// the accumulated text is misread as a snapshot; providers are consistent
/// within one response, so this is accepted.
#[derive(Debug, Default)]
pub struct Reassembler {
    printed: String,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one fragment and returns the text that has not been shown yet
    /// (possibly empty).
    pub fn push(&mut self, fragment: &str) -> &str {
        let start = self.printed.len();
        if fragment.starts_with(self.printed.as_str()) {
            self.printed.push_str(&fragment[start..]);
        } else {
            self.printed.push_str(fragment);
        }
        &self.printed[start..]
    }

    pub fn text(&self) -> &str {
        &self.printed
    }

    pub fn into_text(self) -> String {
        self.printed
    }
}

/// Drains a fragment stream, writing each new piece of text to `out` as soon
/// as it arrives, and returns the reassembled answer.
///
/// Empty fragments are ignored. If anything was written and the answer does
/// not end with a newline, one is written for display; the returned string
/// is left untouched. The first error in the stream aborts and propagates.
pub async fn reassemble<S, W>(fragments: S, out: &mut W) -> Result<String>
where
    S: Stream<Item = Result<String>>,
    W: Write + ?Sized,
{
    let mut fragments = std::pin::pin!(fragments);
    let mut reassembler = Reassembler::new();
    let mut wrote_any = false;

    while let Some(fragment) = fragments.next().await {
        let fragment = fragment?;
        if fragment.is_empty() {
            continue;
        }
        wrote_any = true;

        let delta = reassembler.push(&fragment);
        if !delta.is_empty() {
            out.write_all(delta.as_bytes())
                .context("Failed to write streamed answer")?;
            out.flush().context("Failed to flush streamed answer")?;
        }
    }

    if wrote_any && !reassembler.text().ends_with('\n') {
        writeln!(out).context("Failed to write streamed answer")?;
    }

    Ok(reassembler.into_text())
}
