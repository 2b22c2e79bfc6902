use serde_json::Value;

// ── Event formatting ─────────────────────────────────────────────────

/// One `event:`/`data:` frame of a text/event-stream body.
pub fn sse_event(event: &str, payload: &Value) -> String {
    format!("event: {event}\ndata: {payload}\n\n")
}

/// Split text into chunks of at most `chunk_size` characters (not bytes,
/// so multi-byte text never tears).
pub fn chunk_text(text: &str, chunk_size: usize) -> Vec<String> {
    if chunk_size == 0 {
        return vec![text.to_string()];
    }
    if text.is_empty() {
        return vec![String::new()];
    }
    let chars: Vec<char> = text.chars().collect();
    chars.chunks(chunk_size).map(|c| c.iter().collect()).collect()
}

// ── Streaming assistant_text extraction ──────────────────────────────

const KEY: &str = "\"assistant_text\"";

enum State {
    SeekKey,
    SeekColon,
    SeekOpenQuote,
    InString,
    Escape,
    Unicode4,
    Done,
}

/// Single-pass state machine over a growing JSON text that emits the
/// decoded characters of the `assistant_text` string value as they
/// arrive, resuming across arbitrary chunk boundaries. Terminal after
/// the closing quote.
pub struct AssistantTextExtractor {
    state: State,
    /// Pre-key carry, bounded to `KEY.len() - 1` characters.
    buf: String,
    unicode_buf: String,
}

impl Default for AssistantTextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl AssistantTextExtractor {
    pub fn new() -> Self {
        AssistantTextExtractor {
            state: State::SeekKey,
            buf: String::new(),
            unicode_buf: String::new(),
        }
    }

    pub fn is_done(&self) -> bool {
        matches!(self.state, State::Done)
    }

    /// Feed the next raw chunk; returns any newly decoded value text.
    pub fn feed(&mut self, raw: &str) -> String {
        if self.is_done() || raw.is_empty() {
            return String::new();
        }

        let mut out = String::new();

        if matches!(self.state, State::SeekKey) {
            self.buf.push_str(raw);
            match self.buf.find(KEY) {
                Some(idx) => {
                    let rest = self.buf[idx + KEY.len()..].to_string();
                    self.buf = String::new();
                    self.state = State::SeekColon;
                    for ch in rest.chars() {
                        self.step(ch, &mut out);
                    }
                }
                None => {
                    // Keep just enough to match a key split across chunks.
                    let keep = KEY.len() - 1;
                    let char_count = self.buf.chars().count();
                    if char_count > keep {
                        let cut = self
                            .buf
                            .char_indices()
                            .nth(char_count - keep)
                            .map(|(i, _)| i)
                            .unwrap_or(0);
                        self.buf.drain(..cut);
                    }
                }
            }
            return out;
        }

        for ch in raw.chars() {
            if self.is_done() {
                break;
            }
            self.step(ch, &mut out);
        }
        out
    }

    fn step(&mut self, ch: char, out: &mut String) {
        match self.state {
            State::SeekKey | State::Done => {}
            State::SeekColon => {
                if ch == ':' {
                    self.state = State::SeekOpenQuote;
                }
            }
            State::SeekOpenQuote => {
                if ch == '"' {
                    self.state = State::InString;
                }
            }
            State::InString => {
                if ch == '\\' {
                    self.state = State::Escape;
                } else if ch == '"' {
                    self.state = State::Done;
                } else {
                    out.push(ch);
                }
            }
            State::Escape => {
                self.state = State::InString;
                match ch {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    '"' => out.push('"'),
                    '\\' => out.push('\\'),
                    'u' => {
                        self.unicode_buf.clear();
                        self.state = State::Unicode4;
                    }
                    other => out.push(other),
                }
            }
            State::Unicode4 => {
                self.unicode_buf.push(ch);
                if self.unicode_buf.len() >= 4 {
                    if let Ok(code) = u32::from_str_radix(&self.unicode_buf[..4], 16) {
                        if let Some(decoded) = char::from_u32(code) {
                            out.push(decoded);
                        }
                    }
                    self.state = State::InString;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(chunks: &[&str]) -> String {
        let mut ex = AssistantTextExtractor::new();
        chunks.iter().map(|c| ex.feed(c)).collect()
    }

    #[test]
    fn whole_document_at_once() {
        let doc = r#"{"assistant_text": "hello world", "intent": "chat"}"#;
        assert_eq!(feed_all(&[doc]), "hello world");
    }

    #[test]
    fn boundary_inside_key() {
        let doc = [r#"{"assist"#, r#"ant_text": "ab""#, "}"];
        assert_eq!(feed_all(&doc), "ab");
    }

    #[test]
    fn boundary_between_backslash_and_escape_target() {
        let doc = [r#"{"assistant_text": "a\"#, r#"nb"}"#];
        assert_eq!(feed_all(&doc), "a\nb");
    }

    #[test]
    fn boundary_inside_unicode_escape() {
        let doc = [r#"{"assistant_text": "x\u00"#, r#"e9y"}"#];
        assert_eq!(feed_all(&doc), "x\u{e9}y");
    }

    #[test]
    fn escapes_decode() {
        let doc = r#"{"assistant_text": "a\tb\r\n\"q\"\\"}"#;
        assert_eq!(feed_all(&[doc]), "a\tb\r\n\"q\"\\");
    }

    #[test]
    fn terminal_after_closing_quote() {
        let mut ex = AssistantTextExtractor::new();
        let got = ex.feed(r#"{"assistant_text": "done", "rationale": "tail text""#);
        assert_eq!(got, "done");
        assert!(ex.is_done());
        assert_eq!(ex.feed("more input"), "");
    }

    #[test]
    fn ignores_other_string_fields() {
        let doc = r#"{"rationale": "not this", "assistant_text": "this", "x": "nor this"}"#;
        assert_eq!(feed_all(&[doc]), "this");
    }

    #[test]
    fn any_chunking_is_sound() {
        let doc = r#"{"intent":"chat","assistant_text":"好的😀 done\n","x":1}"#;
        let expected = "好的😀 done\n";
        let whole = feed_all(&[doc]);
        for size in 1..=7usize {
            let chars: Vec<char> = doc.chars().collect();
            let chunks: Vec<String> =
                chars.chunks(size).map(|c| c.iter().collect()).collect();
            let refs: Vec<&str> = chunks.iter().map(String::as_str).collect();
            assert_eq!(feed_all(&refs), whole, "chunk size {size}");
        }
        assert_eq!(whole, expected);
    }

    #[test]
    fn chunk_text_is_char_aware() {
        assert_eq!(chunk_text("abcdef", 4), vec!["abcd", "ef"]);
        assert_eq!(chunk_text("好的谢谢", 2), vec!["好的", "谢谢"]);
        assert_eq!(chunk_text("", 4), vec![""]);
        assert_eq!(chunk_text("abc", 0), vec!["abc"]);
    }

    #[test]
    fn sse_event_frame() {
        let frame = sse_event("chunk", &serde_json::json!({"a": 1}));
        assert_eq!(frame, "event: chunk\ndata: {\"a\":1}\n\n");
    }
}
