use anyhow::Result;
use inquire::validator::Validation;

use crate::core::form::values::check_bounds;
use crate::core::form::{FieldKind, FieldValue, FormField};

/// Ask for one field with the control its kind calls for. `None` means the
/// user skipped it, so the field stays untouched.
pub fn prompt_field(field: &FormField) -> Result<Option<FieldValue>> {
    let label = prompt_label(field);
    let help = field.description.as_deref().unwrap_or("Press Esc to skip");

    let answer = match &field.control {
        FieldKind::Toggle => {
            return Ok(inquire::Confirm::new(&label)
                .with_default(false)
                .with_help_message(help)
                .prompt_skippable()?
                .map(FieldValue::Flag));
        }
        FieldKind::Select { options } => {
            inquire::Select::new(&label, options.clone())
                .with_help_message(help)
                .prompt_skippable()?
        }
        FieldKind::Textarea | FieldKind::List => {
            let hint = if field.control == FieldKind::List {
                "One item per line"
            } else {
                help
            };
            inquire::Editor::new(&label)
                .with_help_message(hint)
                .prompt_skippable()?
        }
        FieldKind::Number {
            integer,
            minimum,
            maximum,
        } => {
            let (integer, minimum, maximum) = (*integer, *minimum, *maximum);
            inquire::Text::new(&label)
                .with_help_message(help)
                .with_validator(move |input: &str| {
                    if input.trim().is_empty() {
                        return Ok(Validation::Valid);
                    }
                    Ok(match check_bounds(input, integer, minimum, maximum) {
                        Ok(()) => Validation::Valid,
                        Err(msg) => Validation::Invalid(msg.into()),
                    })
                })
                .prompt_skippable()?
        }
        FieldKind::Text => inquire::Text::new(&label)
            .with_help_message(
                field
                    .description
                    .as_deref()
                    .unwrap_or("Enter sends an empty value, Esc skips"),
            )
            .prompt_skippable()?,
    };

    Ok(answer.and_then(|raw| to_field_value(&field.control, raw)))
}

pub(crate) fn prompt_label(field: &FormField) -> String {
    let mut label = field.label.clone();
    if let FieldKind::Number {
        minimum, maximum, ..
    } = &field.control
    {
        match (minimum, maximum) {
            (Some(min), Some(max)) => label.push_str(&format!(" ({}-{})", min, max)),
            (Some(min), None) => label.push_str(&format!(" (min {})", min)),
            (None, Some(max)) => label.push_str(&format!(" (max {})", max)),
            (None, None) => {}
        }
    }
    if field.required {
        label.push_str(" *");
    }
    label.push(':');
    label
}

/// Blank answers are treated as skipped, except for single-line text where
/// an empty answer is kept and sent as `""`. Esc skips every kind.
pub(crate) fn to_field_value(kind: &FieldKind, raw: String) -> Option<FieldValue> {
    if raw.trim().is_empty() && *kind != FieldKind::Text {
        None
    } else {
        Some(FieldValue::Text(raw))
    }
}
