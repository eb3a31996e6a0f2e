//! Unit tests for control sequence decoding and SGR styling.

use sce_toolhost::ansi::style::{parse_sgr_params, DEFAULT_BACKGROUND, DEFAULT_FOREGROUND};
use sce_toolhost::ansi::{
    render_styled, strip_control_sequences, AnsiDecoder, AnsiSink, BasicColor, Color,
    ControlSequence, Style, StyledText, Underline, Weight,
};

#[derive(Default)]
struct Recorder {
    events: Vec<String>,
}

impl AnsiSink for Recorder {
    fn plaintext(&mut self, text: &str) {
        self.events.push(format!("text:{text}"));
    }

    fn control(&mut self, sequence: &ControlSequence) {
        let event = match sequence {
            ControlSequence::Csi { params, final_byte } => {
                format!("csi:{params}{}", char::from(*final_byte))
            }
            ControlSequence::Escape(byte) => format!("esc:{}", char::from(*byte)),
        };
        self.events.push(event);
    }
}

// ── Segmentation ────────────────────────────────────────────────────────────

#[test]
fn text_and_sequences_are_delivered_in_order() {
    let mut decoder = AnsiDecoder::new();
    let mut sink = Recorder::default();
    decoder.feed(b"a\x1b[1;31mb\x1b(c", &mut sink);
    decoder.finish(&mut sink);

    assert_eq!(
        sink.events,
        vec!["text:a", "csi:1;31m", "text:b", "esc:(", "text:c"]
    );
}

#[test]
fn overlong_sequence_is_treated_as_text() {
    let mut input = b"\x1b[".to_vec();
    input.extend_from_slice(&[b'1'; 300]);
    let mut decoder = AnsiDecoder::new();
    let mut sink = Recorder::default();
    decoder.feed(&input, &mut sink);
    decoder.finish(&mut sink);

    assert!(sink.events.iter().all(|event| event.starts_with("text:")));
    let digits: usize = sink
        .events
        .iter()
        .map(|event| event.matches('1').count())
        .sum();
    assert_eq!(digits, 300);
}

#[test]
fn unterminated_sequence_is_dropped_at_finish() {
    let mut decoder = AnsiDecoder::new();
    let mut sink = Recorder::default();
    decoder.feed(b"ok\x1b[12", &mut sink);
    decoder.finish(&mut sink);

    assert_eq!(sink.events, vec!["text:ok"]);
    assert_eq!(decoder.buffered(), 0);
}

#[test]
fn utf8_character_split_across_feeds_survives() {
    let bytes = "grüße".as_bytes();
    let mut decoder = AnsiDecoder::new();
    let mut text = StyledText::new();
    decoder.feed(&bytes[..3], &mut text);
    decoder.feed(&bytes[3..], &mut text);
    decoder.finish(&mut text);

    assert_eq!(text.plain_text(), "grüße");
}

#[test]
fn only_sgr_sequences_carry_codes() {
    let sgr = ControlSequence::Csi {
        params: "1;4".into(),
        final_byte: b'm',
    };
    let cursor = ControlSequence::Csi {
        params: "2".into(),
        final_byte: b'K',
    };
    assert_eq!(sgr.sgr_codes(), Some(vec![1, 4]));
    assert_eq!(cursor.sgr_codes(), None);
    assert_eq!(ControlSequence::Escape(b'c').sgr_codes(), None);
}

// ── Styling ─────────────────────────────────────────────────────────────────

#[test]
fn default_style_is_black_on_white() {
    let style = Style::default();
    assert_eq!(style.foreground, DEFAULT_FOREGROUND);
    assert_eq!(style.background, DEFAULT_BACKGROUND);
    assert_eq!(style.foreground, Color::Basic(BasicColor::Black));
    assert_eq!(style.background, Color::Basic(BasicColor::White));
}

#[test]
fn bold_red_text_is_one_span() {
    let spans = render_styled(b"\x1b[1;31merror\x1b[0m: done");

    assert_eq!(spans.len(), 2);
    assert_eq!(spans[0].text, "error");
    assert_eq!(spans[0].style.weight, Weight::Bold);
    assert_eq!(spans[0].style.foreground, Color::Basic(BasicColor::Red));
    assert_eq!(spans[1].text, ": done");
    assert_eq!(spans[1].style, Style::default());
}

#[test]
fn reset_restores_every_attribute() {
    let mut style = Style::default();
    style.apply_sgr(&[1, 3, 4, 9, 53, 7, 32, 44]);
    style.apply_sgr(&[0]);
    assert_eq!(style, Style::default());
}

#[test]
fn reverse_swaps_rendered_colours_once() {
    let mut style = Style::default();
    style.apply_sgr(&[31, 7]);
    assert!(style.reversed);
    assert_eq!(style.rendered_foreground(), DEFAULT_BACKGROUND);
    assert_eq!(style.rendered_background(), Color::Basic(BasicColor::Red));

    style.apply_sgr(&[7]);
    assert_eq!(
        style.rendered_foreground(),
        DEFAULT_BACKGROUND,
        "a second reverse does not swap back"
    );

    style.apply_sgr(&[27]);
    assert!(!style.reversed);
    assert_eq!(style.rendered_foreground(), Color::Basic(BasicColor::Red));
    assert_eq!(style.rendered_background(), DEFAULT_BACKGROUND);
}

#[test]
fn colour_set_while_reversed_survives_reverse_off() {
    let mut style = Style::default();
    style.apply_sgr(&parse_sgr_params("7;31;27"));

    assert!(!style.reversed);
    assert_eq!(style.foreground, Color::Basic(BasicColor::Red));
    assert_eq!(style.rendered_foreground(), Color::Basic(BasicColor::Red));
    assert_eq!(style.rendered_background(), DEFAULT_BACKGROUND);
}

#[test]
fn codes_40_to_47_set_the_background() {
    let mut style = Style::default();
    style.apply_sgr(&[42]);
    assert_eq!(style.background, Color::Basic(BasicColor::Green));
    assert_eq!(style.foreground, DEFAULT_FOREGROUND);

    style.apply_sgr(&[49]);
    assert_eq!(style.background, DEFAULT_BACKGROUND);
}

#[test]
fn bright_and_extended_colours() {
    let mut style = Style::default();
    style.apply_sgr(&[94, 103]);
    assert_eq!(style.foreground, Color::Bright(BasicColor::Blue));
    assert_eq!(style.background, Color::Bright(BasicColor::Yellow));

    style.apply_sgr(&[38, 5, 208, 48, 2, 10, 20, 30, 4]);
    assert_eq!(style.foreground, Color::Indexed(208));
    assert_eq!(style.background, Color::Rgb(10, 20, 30));
    assert_eq!(
        style.underline,
        Underline::Single,
        "codes after an extended colour still apply"
    );
}

#[test]
fn weight_resets_with_21_and_22() {
    let mut style = Style::default();
    style.apply_sgr(&[1]);
    style.apply_sgr(&[21]);
    assert_eq!(style.weight, Weight::Normal);

    style.apply_sgr(&[2]);
    style.apply_sgr(&[22]);
    assert_eq!(style.weight, Weight::Normal);
}

#[test]
fn empty_sgr_parameters_mean_reset() {
    assert_eq!(parse_sgr_params(""), vec![0]);
    let spans = render_styled(b"\x1b[1mA\x1b[mB");
    assert_eq!(spans[1].text, "B");
    assert_eq!(spans[1].style, Style::default());
}

#[test]
fn style_carries_over_between_feeds() {
    let mut decoder = AnsiDecoder::new();
    let mut text = StyledText::new();
    decoder.feed(b"\x1b[3m", &mut text);
    decoder.feed(b"slanted", &mut text);

    assert!(text.style().italic);
    let spans = text.take_spans();
    assert_eq!(spans.len(), 1);
    assert!(spans[0].style.italic);
    assert!(text.spans().is_empty());
}

// ── Stripping ───────────────────────────────────────────────────────────────

#[test]
fn strip_removes_all_control_sequences() {
    let stripped = strip_control_sequences(b"\x1b[1;32mok\x1b[0m \x1b[2Kline\x1b=");
    assert_eq!(stripped, "ok line");
}

#[test]
fn strip_keeps_plain_text_unchanged() {
    assert_eq!(strip_control_sequences(b"plain\r\ntext"), "plain\r\ntext");
}
