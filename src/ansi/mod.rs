//! ANSI control sequence interpretation.
//!
//! [`AnsiDecoder`] splits a byte stream into text runs and control
//! sequences. [`StyledText`] turns those into styled spans by applying SGR
//! codes to a [`Style`]; [`StrippedText`] keeps only the text.

pub mod decoder;
pub mod style;

pub use decoder::{AnsiDecoder, AnsiSink, ControlSequence};
pub use style::{BasicColor, Color, Style, Underline, Weight};

/// A run of text drawn in one style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyledSpan {
    /// The text.
    pub text: String,
    /// Its rendition.
    pub style: Style,
}

/// Sink building styled spans; the style carries over between feeds.
#[derive(Debug, Clone, Default)]
pub struct StyledText {
    style: Style,
    spans: Vec<StyledSpan>,
}

impl StyledText {
    /// Empty text in the default style.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Style applied to the next text run.
    #[must_use]
    pub fn style(&self) -> Style {
        self.style
    }

    /// Spans collected so far.
    #[must_use]
    pub fn spans(&self) -> &[StyledSpan] {
        &self.spans
    }

    /// Take the collected spans, keeping the current style.
    pub fn take_spans(&mut self) -> Vec<StyledSpan> {
        std::mem::take(&mut self.spans)
    }

    /// Concatenated text of all spans.
    #[must_use]
    pub fn plain_text(&self) -> String {
        self.spans.iter().map(|span| span.text.as_str()).collect()
    }
}

impl AnsiSink for StyledText {
    fn plaintext(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        match self.spans.last_mut() {
            Some(last) if last.style == self.style => last.text.push_str(text),
            _ => self.spans.push(StyledSpan {
                text: text.to_owned(),
                style: self.style,
            }),
        }
    }

    fn control(&mut self, sequence: &ControlSequence) {
        if let Some(codes) = sequence.sgr_codes() {
            self.style.apply_sgr(&codes);
        }
    }
}

/// Sink that discards every control sequence.
#[derive(Debug, Clone, Default)]
pub struct StrippedText(pub String);

impl AnsiSink for StrippedText {
    fn plaintext(&mut self, text: &str) {
        self.0.push_str(text);
    }

    fn control(&mut self, _sequence: &ControlSequence) {}
}

/// Decode a complete buffer into styled spans.
#[must_use]
pub fn render_styled(bytes: &[u8]) -> Vec<StyledSpan> {
    let mut decoder = AnsiDecoder::new();
    let mut text = StyledText::new();
    decoder.feed(bytes, &mut text);
    decoder.finish(&mut text);
    text.spans
}

/// Decode a complete buffer, keeping only its text.
#[must_use]
pub fn strip_control_sequences(bytes: &[u8]) -> String {
    let mut decoder = AnsiDecoder::new();
    let mut text = StrippedText::default();
    decoder.feed(bytes, &mut text);
    decoder.finish(&mut text);
    text.0
}
