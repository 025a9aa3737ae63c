//! Code-block highlighting for model replies.
//!
//! Text between pairs of ```` ``` ```` fence delimiters is wrapped in the
//! highlight color, fences included; the rest stays in the prose color.  An
//! unbalanced final fence opens a highlighted region that is never closed.

/// The fence delimiter.
pub const FENCE: &str = "```";

/// ANSI escape code for the highlighted code color (yellow).
pub const HIGHLIGHT_COLOR: &str = "\x1b[33m";

/// ANSI escape code for the prose color (white).
pub const PROSE_COLOR: &str = "\x1b[37m";

/// Highlight the fenced code blocks of a complete reply.
///
/// Without color, or without fences, the text is returned unchanged.
pub fn highlight_code_blocks(text: &str, use_color: bool) -> String {
    if !use_color {
        return text.to_string();
    }
    let segments = text.split(FENCE).collect::<Vec<_>>();
    let last = segments.len() - 1;
    let mut out = String::with_capacity(text.len() + 16);
    for (index, segment) in segments.iter().enumerate() {
        if index % 2 == 0 {
            out.push_str(segment);
        } else if index == last {
            // Unbalanced: the opening fence has no partner.
            out.push_str(HIGHLIGHT_COLOR);
            out.push_str(FENCE);
            out.push_str(segment);
        } else {
            out.push_str(HIGHLIGHT_COLOR);
            out.push_str(FENCE);
            out.push_str(segment);
            out.push_str(FENCE);
            out.push_str(PROSE_COLOR);
        }
    }
    out
}

/// Incremental form of [`highlight_code_blocks`] for streamed replies.
///
/// Fences may be split across chunks, so up to two trailing backticks are held
/// back until the next chunk shows whether they start a fence.  The
/// concatenation of every `push` followed by `finish` equals the batch output.
#[derive(Debug, Clone)]
pub struct FenceHighlighter {
    use_color: bool,
    in_code: bool,
    pending_ticks: usize,
}

impl FenceHighlighter {
    /// Creates a highlighter positioned in prose.
    pub fn new(use_color: bool) -> Self {
        Self {
            use_color,
            in_code: false,
            pending_ticks: 0,
        }
    }

    /// Returns true while inside an open code block.
    pub fn in_code(&self) -> bool {
        self.in_code
    }

    /// Feed the next chunk, returning what can be printed now.
    pub fn push(&mut self, chunk: &str) -> String {
        if !self.use_color {
            return chunk.to_string();
        }
        let mut out = String::with_capacity(chunk.len() + 16);
        for c in chunk.chars() {
            if c == '`' {
                self.pending_ticks += 1;
                if self.pending_ticks == 3 {
                    self.pending_ticks = 0;
                    self.toggle(&mut out);
                }
            } else {
                self.flush_ticks(&mut out);
                out.push(c);
            }
        }
        out
    }

    /// Flush anything held back.  Call once after the last chunk.
    pub fn finish(&mut self) -> String {
        let mut out = String::new();
        self.flush_ticks(&mut out);
        out
    }

    fn toggle(&mut self, out: &mut String) {
        if self.in_code {
            out.push_str(FENCE);
            out.push_str(PROSE_COLOR);
        } else {
            out.push_str(HIGHLIGHT_COLOR);
            out.push_str(FENCE);
        }
        self.in_code = !self.in_code;
    }

    fn flush_ticks(&mut self, out: &mut String) {
        for _ in 0..self.pending_ticks {
            out.push('`');
        }
        self.pending_ticks = 0;
    }
}
