//! Command-line style tokenizing of message text.

use courier_core::COMMAND_MARKER;

/// The leading token of a command message, broken into its parts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invocation<'a> {
    /// The full leading token, marker included (`/ping@my_bot`).
    pub token: &'a str,
    /// Command name without marker or mention (`ping`).
    pub name: &'a str,
    /// The bot mention after `@`, if any (`my_bot`).
    pub mention: Option<&'a str>,
    /// Everything after the leading token, with leading whitespace removed.
    pub rest: &'a str,
}

impl Invocation<'_> {
    /// Splits [`rest`](Self::rest) into arguments with [`shell_split`].
    pub fn args(&self) -> Vec<String> {
        shell_split(self.rest)
    }
}

/// Breaks `text` into an [`Invocation`] if it starts with the command marker.
pub fn parse_invocation(text: &str) -> Option<Invocation<'_>> {
    let text = text.trim_start();
    if !text.starts_with(COMMAND_MARKER) {
        return None;
    }

    let (token, rest) = match text.find(char::is_whitespace) {
        Some(at) => (&text[..at], text[at..].trim_start()),
        None => (text, ""),
    };
    let (name, mention) = split_mention(token);

    Some(Invocation {
        token,
        name,
        mention,
        rest,
    })
}

/// Strips the marker and any `@mention` from a command token.
///
/// `"/ping@my_bot"` yields `("ping", Some("my_bot"))`; a token without the
/// marker is taken as a bare name.
pub fn split_mention(token: &str) -> (&str, Option<&str>) {
    let bare = token.strip_prefix(COMMAND_MARKER).unwrap_or(token);
    match bare.split_once('@') {
        Some((name, mention)) => (name, Some(mention)),
        None => (bare, None),
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Quote {
    None,
    Single,
    Double,
}

/// Splits text into arguments the way a POSIX shell would, minus expansion.
///
/// Unquoted whitespace separates arguments. Single quotes keep everything
/// literal; double quotes allow `\` to escape the next character. An
/// unterminated quote runs to the end of the input. Empty quotes (`""`)
/// produce an empty argument.
pub fn shell_split(input: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quote = Quote::None;
    let mut started = false;
    let mut chars = input.chars();

    while let Some(ch) = chars.next() {
        match (quote, ch) {
            (Quote::None, c) if c.is_whitespace() => {
                if started {
                    args.push(std::mem::take(&mut current));
                    started = false;
                }
            }
            (Quote::None, '\'') => {
                quote = Quote::Single;
                started = true;
            }
            (Quote::None, '"') => {
                quote = Quote::Double;
                started = true;
            }
            (Quote::Single, '\'') | (Quote::Double, '"') => quote = Quote::None,
            (Quote::Double, '\\') => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            (_, c) => {
                current.push(c);
                started = true;
            }
        }
    }

    if started {
        args.push(current);
    }

    args
}
