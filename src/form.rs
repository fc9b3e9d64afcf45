//! Schema-driven metadata forms
//!
//! `render` turns a schema plus current values into a form description, the other
//! helpers merge edits and compute the local submission guard. None of them keep
//! state between calls. `prompt_form` drives a rendered form on a terminal.

use serde_json::Value;
use std::io::{self, BufRead, Write};

use crate::fields::{FieldDefinition, FieldKind, MetadataSchema, MetadataValues};

/// Label of the neutral choice that leaves a select field unset
pub const UNSELECTED_LABEL: &str = "Select...";

/// Rows shown for multi-line inputs
pub const TEXTAREA_ROWS: u8 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub value: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputKind {
    TextLine,
    TextArea { rows: u8 },
    Number,
    Select { choices: Vec<Choice> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormField {
    pub name: String,
    pub required: bool,
    pub input: InputKind,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Form {
    pub fields: Vec<FormField>,
}

/// String shown in an input for a stored metadata value
pub fn value_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Describe the inputs for `schema`, filled from `values`
pub fn render(schema: &MetadataSchema, values: &MetadataValues) -> Form {
    let fields = schema
        .fields
        .iter()
        .map(|field| {
            let input = match &field.kind {
                FieldKind::Text => InputKind::TextLine,
                FieldKind::Textarea => InputKind::TextArea {
                    rows: TEXTAREA_ROWS,
                },
                FieldKind::Number => InputKind::Number,
                FieldKind::Select { options } => {
                    let mut choices = Vec::with_capacity(options.len() + 1);
                    choices.push(Choice {
                        value: String::new(),
                        label: UNSELECTED_LABEL.to_string(),
                    });
                    choices.extend(options.iter().map(|option| Choice {
                        value: option.clone(),
                        label: option.clone(),
                    }));
                    InputKind::Select { choices }
                }
            };
            FormField {
                name: field.name.clone(),
                required: field.required,
                input,
                value: value_text(values.get(&field.name)),
            }
        })
        .collect();

    Form { fields }
}

/// Replace one key, keeping every other entry as it was
pub fn on_change(values: &MetadataValues, field_name: &str, new_value: Value) -> MetadataValues {
    let mut updated = values.clone();
    updated.insert(field_name.to_string(), new_value);
    updated
}

/// Required fields that are still empty; a non-empty result blocks submission
pub fn missing_required(schema: &MetadataSchema, values: &MetadataValues) -> Vec<String> {
    schema
        .fields
        .iter()
        .filter(|field| field.required)
        .filter(|field| value_text(values.get(&field.name)).trim().is_empty())
        .map(|field| field.name.clone())
        .collect()
}

/// Values for editing an existing instance: stored metadata, with every schema
/// field that has no stored value starting out empty
pub fn initial_values(schema: &MetadataSchema, stored: &MetadataValues) -> MetadataValues {
    let mut values = stored.clone();
    for field in &schema.fields {
        values
            .entry(field.name.clone())
            .or_insert_with(|| Value::String(String::new()));
    }
    values
}

fn read_line<R: BufRead>(input: &mut R) -> io::Result<String> {
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "input closed while filling the form",
        ));
    }
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

/// Ask for one field until the answer fits its input kind
///
/// An empty answer keeps the current value, `-` clears it.
fn prompt_field<R: BufRead, W: Write>(
    field: &FormField,
    input: &mut R,
    output: &mut W,
) -> io::Result<String> {
    let marker = if field.required { " *" } else { "" };
    loop {
        match &field.input {
            InputKind::Select { choices } => {
                writeln!(output, "{}{}", field.name, marker)?;
                for (idx, choice) in choices.iter().enumerate() {
                    writeln!(output, "  {}) {}", idx, choice.label)?;
                }
                write!(output, "choice [{}]: ", field.value)?;
            }
            InputKind::TextArea { .. } => {
                write!(
                    output,
                    "{}{} (end with an empty line) [{}]: ",
                    field.name, marker, field.value
                )?;
            }
            _ => write!(output, "{}{} [{}]: ", field.name, marker, field.value)?,
        }
        output.flush()?;

        let answer = read_line(input)?;
        if answer.is_empty() {
            return Ok(field.value.clone());
        }
        if answer == "-" {
            return Ok(String::new());
        }

        match &field.input {
            InputKind::TextLine => return Ok(answer),
            InputKind::TextArea { .. } => {
                let mut lines = vec![answer];
                loop {
                    let next = read_line(input)?;
                    if next.is_empty() {
                        break;
                    }
                    lines.push(next);
                }
                return Ok(lines.join("\n"));
            }
            InputKind::Number => {
                if answer.trim().parse::<f64>().is_ok() {
                    return Ok(answer.trim().to_string());
                }
                writeln!(output, "Please enter a number")?;
            }
            InputKind::Select { choices } => {
                let picked = answer
                    .trim()
                    .parse::<usize>()
                    .ok()
                    .and_then(|idx| choices.get(idx))
                    .or_else(|| choices.iter().skip(1).find(|c| c.value == answer));
                match picked {
                    Some(choice) => return Ok(choice.value.clone()),
                    None => writeln!(output, "Unknown choice '{}'", answer)?,
                }
            }
        }
    }
}

/// Fill the form for `schema` on a terminal, starting from `values`
///
/// Required fields left empty are asked again until they are filled, so the
/// returned values always pass `missing_required`.
pub fn prompt_form<R: BufRead, W: Write>(
    schema: &MetadataSchema,
    values: &MetadataValues,
    input: &mut R,
    output: &mut W,
) -> io::Result<MetadataValues> {
    let mut values = values.clone();
    for field in render(schema, &values).fields {
        let answer = prompt_field(&field, input, output)?;
        values = on_change(&values, &field.name, Value::String(answer));
    }

    loop {
        let missing = missing_required(schema, &values);
        if missing.is_empty() {
            return Ok(values);
        }
        writeln!(output, "Required: {}", missing.join(", "))?;
        let form = render(schema, &values);
        for field in form.fields.iter().filter(|f| missing.contains(&f.name)) {
            let answer = prompt_field(field, input, output)?;
            values = on_change(&values, &field.name, Value::String(answer));
        }
    }
}

fn parse_kind(answer: &str) -> Option<FieldKind> {
    match answer.trim().to_lowercase().as_str() {
        "" | "text" => Some(FieldKind::Text),
        "textarea" => Some(FieldKind::Textarea),
        "number" => Some(FieldKind::Number),
        "select" => Some(FieldKind::Select {
            options: Vec::new(),
        }),
        _ => None,
    }
}

/// Define metadata fields on a terminal, one field per round
///
/// An empty field name finishes the schema. Names already used are asked again,
/// so the result always passes `MetadataSchema::validate`.
pub fn prompt_schema<R: BufRead, W: Write>(
    input: &mut R,
    output: &mut W,
) -> io::Result<MetadataSchema> {
    let mut fields: Vec<FieldDefinition> = Vec::new();
    loop {
        write!(output, "Field name (empty to finish): ")?;
        output.flush()?;
        let name = read_line(input)?.trim().to_string();
        if name.is_empty() {
            return Ok(MetadataSchema::new(fields));
        }
        if fields.iter().any(|f| f.name == name) {
            writeln!(output, "Field '{}' already exists", name)?;
            continue;
        }

        let mut kind = loop {
            write!(output, "Type (text, textarea, number, select) [text]: ")?;
            output.flush()?;
            let answer = read_line(input)?;
            match parse_kind(&answer) {
                Some(kind) => break kind,
                None => writeln!(output, "Unknown type '{}'", answer.trim())?,
            }
        };
        if let FieldKind::Select { options } = &mut kind {
            write!(output, "Options, comma separated: ")?;
            output.flush()?;
            *options = read_line(input)?
                .split(',')
                .map(str::trim)
                .filter(|option| !option.is_empty())
                .map(str::to_string)
                .collect();
        }

        write!(output, "Required? (y/N): ")?;
        output.flush()?;
        let required = matches!(read_line(input)?.trim(), "y" | "Y" | "yes");

        fields.push(FieldDefinition::new(name, kind, required));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldDefinition;
    use serde_json::json;
    use std::io::Cursor;

    fn sample_schema() -> MetadataSchema {
        MetadataSchema::new(vec![
            FieldDefinition::new(
                "Current Step",
                FieldKind::Select {
                    options: vec!["Report Pull".into(), "Review".into()],
                },
                false,
            ),
            FieldDefinition::new("Client Name", FieldKind::Text, true),
            FieldDefinition::new("Notes", FieldKind::Textarea, false),
            FieldDefinition::new("Slides", FieldKind::Number, false),
        ])
    }

    fn values(value: serde_json::Value) -> MetadataValues {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_render_maps_each_kind_to_one_input() {
        let form = render(&sample_schema(), &MetadataValues::new());
        let inputs: Vec<&InputKind> = form.fields.iter().map(|f| &f.input).collect();
        assert!(matches!(inputs[0], InputKind::Select { .. }));
        assert_eq!(inputs[1], &InputKind::TextLine);
        assert_eq!(inputs[2], &InputKind::TextArea { rows: 3 });
        assert_eq!(inputs[3], &InputKind::Number);
        assert!(form.fields[1].required);
    }

    #[test]
    fn test_select_starts_with_unselected_then_schema_order() {
        let form = render(&sample_schema(), &MetadataValues::new());
        let InputKind::Select { choices } = &form.fields[0].input else {
            panic!("expected select");
        };
        let labels: Vec<&str> = choices.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, vec![UNSELECTED_LABEL, "Report Pull", "Review"]);
        assert_eq!(choices[0].value, "");
    }

    #[test]
    fn test_render_fills_current_values() {
        let form = render(
            &sample_schema(),
            &values(json!({ "Client Name": "Acme", "Slides": 12, "Notes": null })),
        );
        assert_eq!(form.fields[1].value, "Acme");
        assert_eq!(form.fields[2].value, "");
        assert_eq!(form.fields[3].value, "12");
    }

    #[test]
    fn test_on_change_is_shallow_merge() {
        let before = values(json!({ "Client Name": "Acme", "Other": "kept" }));
        let after = on_change(&before, "Client Name", json!("Globex"));
        assert_eq!(after["Client Name"], json!("Globex"));
        assert_eq!(after["Other"], json!("kept"));
        assert_eq!(before["Client Name"], json!("Acme"));
    }

    #[test]
    fn test_missing_required_reports_blank_fields() {
        let schema = sample_schema();
        assert_eq!(
            missing_required(&schema, &MetadataValues::new()),
            vec!["Client Name".to_string()]
        );
        assert_eq!(
            missing_required(&schema, &values(json!({ "Client Name": "  " }))),
            vec!["Client Name".to_string()]
        );
        assert!(missing_required(&schema, &values(json!({ "Client Name": "Acme" }))).is_empty());
    }

    #[test]
    fn test_initial_values_fall_back_to_empty() {
        let stored = values(json!({ "Client Name": "Acme", "Legacy": "x" }));
        let initial = initial_values(&sample_schema(), &stored);
        assert_eq!(initial["Client Name"], json!("Acme"));
        assert_eq!(initial["Notes"], json!(""));
        assert_eq!(initial["Current Step"], json!(""));
        assert_eq!(initial["Legacy"], json!("x"));
    }

    #[test]
    fn test_prompt_form_fills_all_kinds() {
        // select by number, text, two-line textarea, invalid then valid number
        let answers = "2\nAcme\nline one\nline two\n\nabc\n7\n";
        let mut input = Cursor::new(answers.as_bytes());
        let mut output = Vec::new();

        let filled = prompt_form(&sample_schema(), &MetadataValues::new(), &mut input, &mut output)
            .unwrap();

        assert_eq!(filled["Current Step"], json!("Review"));
        assert_eq!(filled["Client Name"], json!("Acme"));
        assert_eq!(filled["Notes"], json!("line one\nline two"));
        assert_eq!(filled["Slides"], json!("7"));
        let printed = String::from_utf8(output).unwrap();
        assert!(printed.contains("Please enter a number"));
        assert!(printed.contains("0) Select..."));
    }

    #[test]
    fn test_prompt_form_reasks_required_field() {
        // Client Name left empty first, then filled when asked again
        let answers = "\n\n\n\nAcme\n";
        let mut input = Cursor::new(answers.as_bytes());
        let mut output = Vec::new();

        let filled = prompt_form(&sample_schema(), &MetadataValues::new(), &mut input, &mut output)
            .unwrap();

        assert_eq!(filled["Client Name"], json!("Acme"));
        assert!(String::from_utf8(output).unwrap().contains("Required: Client Name"));
    }

    #[test]
    fn test_prompt_form_keeps_current_values_on_empty_answers() {
        let start = values(json!({ "Client Name": "Acme", "Current Step": "Review" }));
        let mut input = Cursor::new("\n\n\n\n".as_bytes());
        let mut output = Vec::new();

        let filled = prompt_form(&sample_schema(), &start, &mut input, &mut output).unwrap();
        assert_eq!(filled["Client Name"], json!("Acme"));
        assert_eq!(filled["Current Step"], json!("Review"));
    }

    #[test]
    fn test_prompt_schema_collects_fields_in_order() {
        let answers = "Current Step\nselect\nReport Pull, Review,\ny\n\
                       Notes\ntextarea\n\n\
                       Notes\n\
                       Slides\ndate\nnumber\nn\n\n";
        let mut input = Cursor::new(answers.as_bytes());
        let mut output = Vec::new();

        let schema = prompt_schema(&mut input, &mut output).unwrap();

        assert_eq!(
            schema.fields,
            vec![
                FieldDefinition::new(
                    "Current Step",
                    FieldKind::Select {
                        options: vec!["Report Pull".into(), "Review".into()]
                    },
                    true
                ),
                FieldDefinition::new("Notes", FieldKind::Textarea, false),
                FieldDefinition::new("Slides", FieldKind::Number, false),
            ]
        );
        assert!(schema.validate().is_ok());
        let printed = String::from_utf8(output).unwrap();
        assert!(printed.contains("Field 'Notes' already exists"));
        assert!(printed.contains("Unknown type 'date'"));
    }

    #[test]
    fn test_prompt_schema_empty_name_gives_empty_schema() {
        let mut input = Cursor::new("\n".as_bytes());
        let mut output = Vec::new();
        assert!(prompt_schema(&mut input, &mut output).unwrap().is_empty());
    }

    #[test]
    fn test_prompt_form_errors_when_input_closes() {
        let mut input = Cursor::new("".as_bytes());
        let mut output = Vec::new();
        let err = prompt_form(&sample_schema(), &MetadataValues::new(), &mut input, &mut output)
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
