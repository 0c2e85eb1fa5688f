//! Raw report pages as returned by the reporting API
//!
//! Field names follow the `reports:batchGet` JSON shape so a page can be
//! decoded straight from the response body.

use serde::{Deserialize, Serialize};

/// One page of a report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    #[serde(default)]
    pub column_header: ColumnHeader,
    #[serde(default)]
    pub data: ReportData,
    /// Token for the following page; absent on the last page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

impl Report {
    pub fn new(column_header: ColumnHeader, rows: Option<Vec<ReportRow>>) -> Self {
        let row_count = rows.as_ref().map(|r| r.len() as i64);
        Self {
            column_header,
            data: ReportData { rows, row_count },
            next_page_token: None,
        }
    }

    pub fn with_next_page_token(mut self, token: impl Into<String>) -> Self {
        self.next_page_token = Some(token.into());
        self
    }

    /// Rows of this page, `None` when the API omitted them
    pub fn rows(&self) -> Option<&[ReportRow]> {
        self.data.rows.as_deref()
    }
}

/// Column metadata: dimension names followed by typed metrics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnHeader {
    #[serde(default)]
    pub dimensions: Vec<String>,
    #[serde(default)]
    pub metric_header: MetricHeader,
}

impl ColumnHeader {
    /// Build a header from dimension names and `(metric, declared type)` pairs
    pub fn new<D, M, T>(dimensions: D, metrics: M) -> Self
    where
        D: IntoIterator,
        D::Item: Into<String>,
        M: IntoIterator<Item = (T, T)>,
        T: Into<String>,
    {
        Self {
            dimensions: dimensions.into_iter().map(Into::into).collect(),
            metric_header: MetricHeader {
                metric_header_entries: metrics
                    .into_iter()
                    .map(|(name, metric_type)| MetricHeaderEntry {
                        name: name.into(),
                        metric_type: metric_type.into(),
                    })
                    .collect(),
            },
        }
    }

    pub fn metrics(&self) -> &[MetricHeaderEntry] {
        &self.metric_header.metric_header_entries
    }

    /// Raw column names in cell order: dimensions first, then metrics
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.dimensions
            .iter()
            .map(String::as_str)
            .chain(self.metrics().iter().map(|m| m.name.as_str()))
    }

    pub fn column_count(&self) -> usize {
        self.dimensions.len() + self.metrics().len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricHeader {
    #[serde(default)]
    pub metric_header_entries: Vec<MetricHeaderEntry>,
}

/// A metric column and the type the API declares for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricHeaderEntry {
    pub name: String,
    #[serde(rename = "type", default)]
    pub metric_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<ReportRow>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<i64>,
}

/// One row: dimension values plus one metric value group per date range
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRow {
    #[serde(default)]
    pub dimensions: Vec<String>,
    #[serde(default)]
    pub metrics: Vec<DateRangeValues>,
}

impl ReportRow {
    pub fn new<D, V>(dimensions: D, metric_values: V) -> Self
    where
        D: IntoIterator,
        D::Item: Into<String>,
        V: IntoIterator,
        V::Item: Into<String>,
    {
        Self {
            dimensions: dimensions.into_iter().map(Into::into).collect(),
            metrics: vec![DateRangeValues {
                values: metric_values.into_iter().map(Into::into).collect(),
            }],
        }
    }

    /// Cell values in column order: dimensions, then every metric group
    pub fn cells(&self) -> impl Iterator<Item = &str> {
        self.dimensions.iter().map(String::as_str).chain(
            self.metrics
                .iter()
                .flat_map(|group| group.values.iter().map(String::as_str)),
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRangeValues {
    #[serde(default)]
    pub values: Vec<String>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_api_page() {
        let body = serde_json::json!({
            "columnHeader": {
                "dimensions": ["ga:pagePath", "ga:dateHourMinute"],
                "metricHeader": {
                    "metricHeaderEntries": [{ "name": "pageviews", "type": "INTEGER" }]
                }
            },
            "data": {
                "rows": [
                    { "dimensions": ["/a", "202401010000"], "metrics": [{ "values": ["5"] }] }
                ],
                "rowCount": 1
            },
            "nextPageToken": "1000"
        });

        let report: Report = serde_json::from_value(body).unwrap();
        assert_eq!(report.column_header.column_count(), 3);
        assert_eq!(report.next_page_token.as_deref(), Some("1000"));
        assert_eq!(report.data.row_count, Some(1));

        let cells: Vec<&str> = report.rows().unwrap()[0].cells().collect();
        assert_eq!(cells, vec!["/a", "202401010000", "5"]);
    }

    #[test]
    fn test_missing_rows_decode_as_none() {
        let body = serde_json::json!({
            "columnHeader": { "dimensions": ["ga:pagePath"] },
            "data": { "totals": [{ "values": ["0"] }] }
        });

        let report: Report = serde_json::from_value(body).unwrap();
        assert!(report.rows().is_none());
        assert!(report.next_page_token.is_none());
    }

    #[test]
    fn test_cells_flatten_metric_groups() {
        let row = ReportRow {
            dimensions: vec!["/home".to_string()],
            metrics: vec![
                DateRangeValues { values: vec!["1".to_string(), "2".to_string()] },
                DateRangeValues { values: vec!["3".to_string()] },
            ],
        };
        assert_eq!(row.cells().collect::<Vec<_>>(), vec!["/home", "1", "2", "3"]);
    }
}
