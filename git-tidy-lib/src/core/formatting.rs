//! Formatting and output helpers.
//!
//! We try to handle both textual output and interactive output (output to a
//! "TTY"). In the case of interactive output, we render with prettier non-ASCII
//! characters and with colors, using shell-specific escape codes.

use std::fmt::Display;

use cursive_core::theme::{BaseColor, Color, ColorType, Effect, Style};
use cursive_core::utils::markup::StyledString;
use cursive_core::utils::span::Span;

use crate::core::effects::icons;

/// Pluralize a quantity, as appropriate. Example:
///
/// ```
/// # use tidy::core::formatting::Pluralize;
/// let p = Pluralize {
///     determiner: None,
///     amount: 1,
///     unit: ("commit", "commits"),
/// };
/// assert_eq!(p.to_string(), "1 commit");
///
/// let p = Pluralize {
///     determiner: Some(("this", "these")),
///     amount: 2,
///     unit: ("commit", "commits"),
/// };
/// assert_eq!(p.to_string(), "these 2 commits");
/// ```
pub struct Pluralize<'a> {
    /// The string to render before the amount, if any, in its singular and
    /// plural forms.
    pub determiner: Option<(&'a str, &'a str)>,

    /// The amount of the quantity.
    pub amount: usize,

    /// The unit of the quantity, in its singular and plural forms.
    pub unit: (&'a str, &'a str),
}

impl Display for Pluralize<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Self {
            determiner,
            amount,
            unit: (singular_unit, plural_unit),
        } = self;
        let unit = if *amount == 1 {
            singular_unit
        } else {
            plural_unit
        };
        match determiner {
            None => write!(f, "{amount} {unit}"),
            Some((singular_determiner, plural_determiner)) => {
                let determiner = if *amount == 1 {
                    singular_determiner
                } else {
                    plural_determiner
                };
                write!(f, "{determiner} {amount} {unit}")
            }
        }
    }
}

/// Glyphs to use for rendering output.
#[derive(Clone, Debug)]
pub struct Glyphs {
    /// Whether or not ANSI escape codes should be emitted (e.g. to render
    /// color).
    pub should_write_ansi_escape_codes: bool,

    /// Bullet-point character for a list of newline-separated items.
    pub bullet_point: &'static str,

    /// Arrow used to describe one thing moving onto another.
    pub right_arrow: &'static str,

    /// Separator between a commit's OID and its summary.
    pub commit_separator: &'static str,
}

impl Glyphs {
    /// Make the `Glyphs` object appropriate for `stdout`.
    pub fn detect() -> Self {
        if console::user_attended() {
            Glyphs::pretty()
        } else {
            Glyphs::text()
        }
    }

    /// Glyphs used for output to a text file or non-TTY.
    pub fn text() -> Self {
        Glyphs {
            should_write_ansi_escape_codes: false,
            bullet_point: "-",
            right_arrow: "->",
            commit_separator: " ",
        }
    }

    /// Glyphs used for output to a TTY.
    pub fn pretty() -> Self {
        Glyphs {
            should_write_ansi_escape_codes: true,
            bullet_point: "•",
            right_arrow: "→",
            commit_separator: " ",
        }
    }

    /// Render a styled string into a string suitable for writing to the
    /// output stream. Styling is dropped if this `Glyphs` object does not
    /// support ANSI escape codes.
    pub fn render(&self, string: StyledString) -> eyre::Result<String> {
        let result = string
            .spans()
            .map(|span| {
                let Span {
                    content,
                    attr,
                    width: _,
                } = span;
                if self.should_write_ansi_escape_codes {
                    render_style_as_ansi(content, *attr)
                } else {
                    Ok(content.to_string())
                }
            })
            .collect::<eyre::Result<String>>()?;
        Ok(result)
    }
}

fn render_style_as_ansi(content: &str, style: Style) -> eyre::Result<String> {
    let Style { effects, color } = style;
    let output = {
        use console::style;
        let output = content.to_string();
        match color.front {
            ColorType::Palette(_) => {
                eyre::bail!("Not implemented: using cursive palette colors")
            }
            ColorType::Color(Color::Rgb(..)) | ColorType::Color(Color::RgbLowRes(..)) => {
                eyre::bail!("Not implemented: using raw RGB colors")
            }
            ColorType::InheritParent | ColorType::Color(Color::TerminalDefault) => style(output),
            ColorType::Color(Color::Dark(color)) => match color {
                BaseColor::Black => style(output).black(),
                BaseColor::Red => style(output).red(),
                BaseColor::Green => style(output).green(),
                BaseColor::Yellow => style(output).yellow(),
                BaseColor::Blue => style(output).blue(),
                BaseColor::Magenta => style(output).magenta(),
                BaseColor::Cyan => style(output).cyan(),
                BaseColor::White => style(output).white(),
            },
            ColorType::Color(Color::Light(color)) => match color {
                BaseColor::Black => style(output).black().bright(),
                BaseColor::Red => style(output).red().bright(),
                BaseColor::Green => style(output).green().bright(),
                BaseColor::Yellow => style(output).yellow().bright(),
                BaseColor::Blue => style(output).blue().bright(),
                BaseColor::Magenta => style(output).magenta().bright(),
                BaseColor::Cyan => style(output).cyan().bright(),
                BaseColor::White => style(output).white().bright(),
            },
        }
    };

    let output = effects
        .iter()
        .fold(output, |output, effect| match effect {
            Effect::Bold => output.bold(),
            Effect::Italic => output.italic(),
            Effect::Underline => output.underlined(),
            Effect::Reverse => output.reverse(),
            Effect::Blink => output.blink(),
            _ => output,
        })
        .force_styling(true);
    Ok(output.to_string())
}

/// Helper to build `StyledString`s by combining multiple differently-styled
/// substrings.
#[derive(Debug, Default)]
pub struct StyledStringBuilder {
    elements: Vec<StyledString>,
}

impl StyledStringBuilder {
    /// Constructor.
    pub fn new() -> Self {
        Default::default()
    }

    fn append_plain_inner(mut self, text: &str) -> Self {
        self.elements.push(StyledString::plain(text));
        self
    }

    /// Append a plain-text string to the internal buffer.
    pub fn append_plain(self, text: impl AsRef<str>) -> Self {
        self.append_plain_inner(text.as_ref())
    }

    fn append_styled_inner(mut self, text: &str, style: Style) -> Self {
        self.elements.push(StyledString::styled(text, style));
        self
    }

    /// Style the provided `text` using `style`, then append it to the internal
    /// buffer.
    pub fn append_styled(self, text: impl AsRef<str>, style: impl Into<Style>) -> Self {
        self.append_styled_inner(text.as_ref(), style.into())
    }

    /// Directly append the provided `StyledString` to the internal buffer.
    pub fn append(mut self, text: impl Into<StyledString>) -> Self {
        self.elements.push(text.into());
        self
    }

    /// Create a new `StyledString` using all the components in the internal
    /// buffer.
    pub fn build(self) -> StyledString {
        let mut result = StyledString::new();
        for element in self.elements {
            result.append(element);
        }
        result
    }

    /// Helper function to join a list of `StyledString`s into a single
    /// `StyledString`s, using the provided `delimiter`.
    pub fn join(delimiter: impl Into<String>, strings: Vec<StyledString>) -> StyledString {
        let delimiter = delimiter.into();
        let mut result = StyledString::new();
        let mut is_first = true;
        for string in strings {
            if is_first {
                is_first = false;
            } else {
                result.append_plain(&delimiter);
            }
            result.append(string);
        }
        result
    }
}

/// The kind of a one-line status message printed at the end of a step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusKind {
    /// The step completed.
    Success,

    /// The step did nothing, or completed with a caveat.
    Warning,

    /// The step failed.
    Error,
}

/// Render a colored status line, such as `✓ Synced feature onto upstream/main`.
pub fn make_status_line(kind: StatusKind, message: impl AsRef<str>) -> StyledString {
    let (icon, color) = match kind {
        StatusKind::Success => (icons::CHECKMARK, BaseColor::Green),
        StatusKind::Warning => (icons::EXCLAMATION, BaseColor::Yellow),
        StatusKind::Error => (icons::CROSS, BaseColor::Red),
    };
    StyledStringBuilder::new()
        .append_styled(
            format!("{icon} "),
            Style::merge(&[color.light().into(), Effect::Bold.into()]),
        )
        .append_styled(message.as_ref(), color.light())
        .build()
}
