// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Lab report parsing: PDF text extraction and lab value recognition.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use lopdf::content::Content;
use lopdf::{Document, Object, ObjectId};
use regex::Regex;
use serde::Serialize;

/// Canonical lab test keys and the names they appear under.
///
/// Matching is a case-insensitive prefix match; the longest alias wins, so
/// "Hemoglobin A1c" is `hba1c` and not `hemoglobin`.
const LAB_TESTS: &[(&str, &[&str])] = &[
    ("hba1c", &["hba1c", "hb a1c", "hemoglobin a1c", "glycated hemoglobin", "a1c"]),
    ("glucose", &["fasting glucose", "glucose", "blood sugar"]),
    ("total_cholesterol", &["total cholesterol", "cholesterol total", "cholesterol"]),
    ("hdl", &["hdl cholesterol", "hdl"]),
    ("ldl", &["ldl cholesterol", "ldl"]),
    ("triglycerides", &["triglycerides", "trigs"]),
    ("hemoglobin", &["hemoglobin", "haemoglobin", "hgb"]),
    ("creatinine", &["creatinine"]),
    ("tsh", &["tsh", "thyroid stimulating hormone"]),
    ("vitamin_d", &["vitamin d"]),
    ("vitamin_b12", &["vitamin b12", "b12"]),
    ("ferritin", &["ferritin"]),
    ("crp", &["c-reactive protein", "crp"]),
];

/// `name  value  unit`, with an optional colon after the name.
static LAB_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Za-z][A-Za-z0-9 ()\-]*?)(?:\s*:\s*|\s+)(\d+(?:[.,]\d+)?)\s*([A-Za-z%µ][A-Za-z%µ/]*)")
        .expect("lab line regex")
});

/// One recognized lab measurement.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LabValue {
    pub value: f64,
    pub unit: String,
    /// The report line it came from
    pub raw_line: String,
}

/// Recognized measurements keyed by canonical test name.
pub type LabValues = BTreeMap<String, LabValue>;

/// Lab report errors
#[derive(Debug, thiserror::Error)]
pub enum LabReportError {
    #[error("Failed to read PDF: {0}")]
    Pdf(String),
}

/// Kerning in a `TJ` array wide enough to count as a word gap.
const TJ_SPACE_THRESHOLD: f64 = 200.0;

/// Extract the text of every page, in page order.
///
/// Walks the content stream operators so that moving to a new text line
/// (`Td`/`TD` with a vertical offset, `T*`, `'`, `"`, end of a text object)
/// starts a new output line.
pub fn extract_pdf_text(bytes: &[u8]) -> Result<Vec<String>, LabReportError> {
    let doc = Document::load_mem(bytes).map_err(|e| LabReportError::Pdf(e.to_string()))?;

    let mut pages = Vec::new();
    for (page_number, page_id) in doc.get_pages() {
        match page_text(&doc, page_id) {
            Ok(text) => pages.push(text),
            Err(e) => {
                tracing::warn!(page = page_number, error = %e, "Could not extract page text");
                pages.push(String::new());
            }
        }
    }
    Ok(pages)
}

fn page_text(doc: &Document, page_id: ObjectId) -> Result<String, lopdf::Error> {
    let content = Content::decode(&doc.get_page_content(page_id)?)?;
    let mut text = PageText::default();

    for op in &content.operations {
        match op.operator.as_str() {
            "Tj" => op.operands.iter().for_each(|o| text.push_string(o)),
            "TJ" => op
                .operands
                .iter()
                .filter_map(|o| o.as_array().ok())
                .for_each(|items| text.push_spaced_strings(items)),
            "'" | "\"" => {
                text.new_line();
                if let Some(last) = op.operands.last() {
                    text.push_string(last);
                }
            }
            "Td" | "TD" => {
                let dy = op.operands.get(1).and_then(number).unwrap_or(0.0);
                if dy != 0.0 {
                    text.new_line();
                } else {
                    text.push_space();
                }
            }
            "T*" | "ET" => text.new_line(),
            _ => {}
        }
    }

    Ok(text.finish())
}

/// Accumulates page text line by line.
#[derive(Default)]
struct PageText {
    lines: Vec<String>,
    current: String,
}

impl PageText {
    fn push_string(&mut self, object: &Object) {
        if let Object::String(bytes, _) = object {
            self.current.push_str(&decode_pdf_string(bytes));
        }
    }

    /// A `TJ` array: strings interleaved with kerning adjustments.
    fn push_spaced_strings(&mut self, items: &[Object]) {
        for item in items {
            match number(item) {
                Some(kern) if kern <= -TJ_SPACE_THRESHOLD => self.push_space(),
                Some(_) => {}
                None => self.push_string(item),
            }
        }
    }

    fn push_space(&mut self) {
        if !self.current.is_empty() && !self.current.ends_with(' ') {
            self.current.push(' ');
        }
    }

    fn new_line(&mut self) {
        let line = std::mem::take(&mut self.current);
        if !line.trim().is_empty() {
            self.lines.push(line);
        }
    }

    fn finish(mut self) -> String {
        self.new_line();
        self.lines.join("\n")
    }
}

fn number(object: &Object) -> Option<f64> {
    match object {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

/// UTF-16BE when the string carries a byte order mark, single-byte otherwise.
fn decode_pdf_string(bytes: &[u8]) -> String {
    match bytes {
        [0xFE, 0xFF, rest @ ..] => {
            let units: Vec<u16> = rest
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16_lossy(&units)
        }
        _ => bytes.iter().map(|&b| char::from(b)).collect(),
    }
}

/// Parse a PDF lab report into recognized measurements.
pub fn parse_lab_report(bytes: &[u8]) -> Result<LabValues, LabReportError> {
    let pages = extract_pdf_text(bytes)?;
    let values = parse_lab_lines(pages.iter().flat_map(|page| page.lines()));
    tracing::debug!(pages = pages.len(), recognized = values.len(), "Parsed lab report");
    Ok(values)
}

/// Recognize lab measurements in report lines. The first line for a test wins.
pub fn parse_lab_lines<'a, I>(lines: I) -> LabValues
where
    I: IntoIterator<Item = &'a str>,
{
    let mut values = LabValues::new();

    for line in lines {
        let Some(caps) = LAB_LINE_RE.captures(line) else {
            continue;
        };
        let Some(key) = canonical_test(&caps[1]) else {
            continue;
        };
        if values.contains_key(key) {
            continue;
        }
        let Ok(value) = caps[2].replace(',', ".").parse::<f64>() else {
            continue;
        };

        values.insert(
            key.to_string(),
            LabValue {
                value,
                unit: caps[3].to_string(),
                raw_line: line.trim().to_string(),
            },
        );
    }

    values
}

/// Map a test name as printed to its canonical key.
pub fn canonical_test(name: &str) -> Option<&'static str> {
    let name = name.trim().to_lowercase();

    LAB_TESTS
        .iter()
        .flat_map(|(key, aliases)| aliases.iter().map(move |alias| (*key, *alias)))
        .filter(|(_, alias)| name.starts_with(alias))
        .max_by_key(|(_, alias)| alias.len())
        .map(|(key, _)| key)
}

/// Render the values as a one-row CSV table (header line plus value line).
///
/// Each test contributes a `<key>` and a `<key>_unit` column.
pub fn to_csv(values: &LabValues) -> String {
    let mut header = Vec::with_capacity(values.len() * 2);
    let mut row = Vec::with_capacity(values.len() * 2);

    for (key, lab) in values {
        header.push(csv_field(key));
        header.push(csv_field(&format!("{}_unit", key)));
        row.push(lab.value.to_string());
        row.push(csv_field(&lab.unit));
    }

    format!("{}\n{}\n", header.join(","), row.join(","))
}

fn csv_field(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
