//! Splitting a tool's argument string into arguments.

/// Split `text` at whitespace into process arguments.
///
/// A span enclosed in double quotes becomes one argument with the quotes
/// removed: `many "multi arg" things` yields `many`, `multi arg` and
/// `things`. Whitespace inside a quoted span collapses to single spaces.
///
/// An opening quote without a closing one is taken literally: the quote stays
/// part of its word and the remaining words are split as usual, so
/// `a "b c` yields `a`, `"b` and `c`.
#[must_use]
pub fn parse_arguments(text: &str) -> Vec<String> {
    let mut arguments = Vec::new();
    let mut open_span: Vec<&str> = Vec::new();

    for word in text.split_whitespace() {
        if open_span.is_empty() {
            match word.strip_prefix('"') {
                Some(body) => match body.strip_suffix('"') {
                    Some(inner) => arguments.push(inner.to_owned()),
                    None => open_span.push(word),
                },
                None => arguments.push(word.to_owned()),
            }
            continue;
        }

        open_span.push(word);
        if word.ends_with('"') {
            let joined = open_span.join(" ");
            arguments.push(joined[1..joined.len() - 1].to_owned());
            open_span.clear();
        }
    }

    if !open_span.is_empty() {
        tracing::debug!(text, "unbalanced quotation mark in tool arguments");
        arguments.extend(open_span.into_iter().map(str::to_owned));
    }

    arguments
}
