//! CSV output format for attribution results

use crate::attribution::AttributionResult;

/// CSV formatter for per-commit attributions
#[derive(Debug)]
pub struct CsvOutput {
    dimensions: Vec<String>,
    rows: Vec<AttributionResult>,
}

impl CsvOutput {
    /// Create a formatter with one column per dimension, in the given order
    pub fn new<I, S>(dimensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            dimensions: dimensions.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn add_result(&mut self, result: AttributionResult) {
        self.rows.push(result);
    }

    fn header(&self) -> String {
        let mut headers = vec!["commit_id".to_string(), "score".to_string()];
        headers.extend(self.dimensions.iter().map(|d| Self::escape_field(d)));
        headers.join(",")
    }

    /// Escape CSV field (handle commas, quotes, newlines)
    fn escape_field(field: &str) -> String {
        if field.contains(',') || field.contains('"') || field.contains('\n') {
            format!("\"{}\"", field.replace('"', "\"\""))
        } else {
            field.to_string()
        }
    }

    fn format_result(&self, result: &AttributionResult) -> String {
        let mut fields = vec![
            Self::escape_field(&result.commit_id),
            result.score.to_string(),
        ];

        // Absent dimensions render as empty cells
        for dimension in &self.dimensions {
            fields.push(
                result
                    .contribution(dimension)
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
            );
        }

        fields.join(",")
    }

    /// Generate CSV output as string
    pub fn to_csv(&self) -> String {
        let mut output = String::new();

        output.push_str(&self.header());
        output.push('\n');

        for result in &self.rows {
            output.push_str(&self.format_result(result));
            output.push('\n');
        }

        output
    }
}
