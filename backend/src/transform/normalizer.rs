//! Row normalization: raw JSON rows to typed [`Transaction`]s.
//!
//! This is a pure transform. The missing-value policy decides what happens to
//! rows lacking a customer id or an invoice date:
//!
//! | Policy           | Missing customer id      | Missing date    | Missing text       |
//! |------------------|--------------------------|-----------------|--------------------|
//! | `DropIncomplete` | row dropped              | row dropped     | kept missing       |
//! | `FillDefaults`   | set to `-1`              | row kept, inert | `"No Description"` |
//! | `PassThrough`    | row kept, inert          | row kept, inert | kept missing       |
//!
//! "Inert" rows stay in the output but are never aggregated. A date cell that
//! is present but unparseable is an error under every policy.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{NormalizeError, NormalizeResult};
use crate::models::{
    AttrValue, CustomerId, MissingValuePolicy, Transaction, DEFAULT_DESCRIPTION,
};
use crate::schema::{cell_text, parse_timestamp, ColumnType, TableSchema};

/// Counts of what normalization did, for reporting by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizationReport {
    pub input_rows: usize,
    pub kept_rows: usize,
    pub dropped_rows: usize,
    /// Rows whose customer id was set to the `-1` sentinel.
    pub filled_customer_ids: usize,
    /// Text cells set to `"No Description"`.
    pub filled_text_fields: usize,
    /// Kept rows that cannot take part in cohort computation.
    pub incomplete_rows: usize,
}

/// Output of [`normalize`].
#[derive(Debug, Clone)]
pub struct Normalized {
    pub transactions: Vec<Transaction>,
    pub report: NormalizationReport,
}

impl Normalized {
    /// Rows that have both a customer id and an invoice date.
    pub fn complete(&self) -> impl Iterator<Item = &Transaction> {
        self.transactions.iter().filter(|t| t.is_complete())
    }
}

/// Normalize raw rows under the given missing-value policy.
///
/// Fails on the first row whose invoice date is present but cannot be parsed.
pub fn normalize(
    records: &[Value],
    schema: &TableSchema,
    policy: MissingValuePolicy,
) -> NormalizeResult<Normalized> {
    let mut report = NormalizationReport {
        input_rows: records.len(),
        ..Default::default()
    };
    let mut transactions = Vec::with_capacity(records.len());

    for (row, record) in records.iter().enumerate() {
        let mut customer_id =
            cell_text(record.get(&schema.roles.customer)).map(|raw| CustomerId::parse(&raw));
        let invoice_time = read_invoice_time(record, schema, row)?;

        match policy {
            MissingValuePolicy::DropIncomplete => {
                if customer_id.is_none() || invoice_time.is_none() {
                    report.dropped_rows += 1;
                    continue;
                }
            }
            MissingValuePolicy::FillDefaults => {
                if customer_id.is_none() {
                    customer_id = Some(CustomerId::unknown());
                    report.filled_customer_ids += 1;
                }
            }
            MissingValuePolicy::PassThrough => {}
        }

        let fill_text = policy == MissingValuePolicy::FillDefaults;
        let attributes = read_attributes(record, schema, fill_text, &mut report.filled_text_fields);

        let transaction = Transaction {
            row,
            customer_id,
            invoice_time,
            attributes,
        };
        if !transaction.is_complete() {
            report.incomplete_rows += 1;
        }
        transactions.push(transaction);
    }

    report.kept_rows = transactions.len();

    Ok(Normalized {
        transactions,
        report,
    })
}

fn read_invoice_time(
    record: &Value,
    schema: &TableSchema,
    row: usize,
) -> NormalizeResult<Option<chrono::NaiveDateTime>> {
    let column = &schema.roles.invoice_date;
    match cell_text(record.get(column)) {
        None => Ok(None),
        Some(raw) => parse_timestamp(&raw, schema.date_format.as_deref())
            .map(Some)
            .ok_or_else(|| NormalizeError::InvalidTimestamp {
                row,
                column: column.clone(),
                value: raw,
            }),
    }
}

/// Type every non-role cell of a row. Columns not in the schema pass
/// through as text.
fn read_attributes(
    record: &Value,
    schema: &TableSchema,
    fill_text: bool,
    filled: &mut usize,
) -> BTreeMap<String, AttrValue> {
    let Some(obj) = record.as_object() else {
        return BTreeMap::new();
    };

    obj.iter()
        .filter(|(name, _)| !schema.is_role_column(name))
        .map(|(name, value)| {
            let column_type = schema.column_type(name);
            let attr = match cell_text(Some(value)) {
                Some(text) => typed_value(text, column_type, schema.date_format.as_deref()),
                None if fill_text && column_type.is_text() => {
                    *filled += 1;
                    AttrValue::Text(DEFAULT_DESCRIPTION.to_string())
                }
                None => AttrValue::Missing,
            };
            (name.clone(), attr)
        })
        .collect()
}

fn typed_value(text: String, column_type: ColumnType, date_format: Option<&str>) -> AttrValue {
    match column_type {
        ColumnType::Integer => text
            .parse()
            .map(AttrValue::Integer)
            .unwrap_or(AttrValue::Text(text)),
        ColumnType::Float => text
            .parse()
            .map(AttrValue::Float)
            .unwrap_or(AttrValue::Text(text)),
        ColumnType::DateTime => parse_timestamp(&text, date_format)
            .map(AttrValue::Timestamp)
            .unwrap_or(AttrValue::Text(text)),
        ColumnType::Text | ColumnType::Empty => AttrValue::Text(text),
    }
}
