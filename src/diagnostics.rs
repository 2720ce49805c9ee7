use crate::cleaning::is_null;
use log::info;
use std::collections::BTreeSet;

/// Below this many distinct values the values themselves are listed.
static MAX_LISTED_VALUES: usize = 12;

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnReport {
    pub column: String,
    pub distinct: usize,
    /// Sorted distinct values, only filled for low-cardinality columns.
    pub values: Option<Vec<String>>,
    pub nulls: usize,
}

/// Summarise each column of a table and log the result under `label`.
pub fn investigate<R, F>(label: &str, headers: &[String], rows: R) -> Vec<ColumnReport>
where
    R: IntoIterator<Item = F>,
    F: AsRef<[String]>,
{
    let mut distinct: Vec<BTreeSet<String>> = vec![BTreeSet::new(); headers.len()];
    let mut nulls = vec![0usize; headers.len()];

    for row in rows {
        for (i, value) in row.as_ref().iter().enumerate().take(headers.len()) {
            if is_null(value) {
                nulls[i] += 1;
            }
            if !distinct[i].contains(value) {
                distinct[i].insert(value.clone());
            }
        }
    }

    let reports: Vec<ColumnReport> = headers
        .iter()
        .zip(distinct)
        .zip(nulls)
        .map(|((column, values), nulls)| ColumnReport {
            column: column.clone(),
            distinct: values.len(),
            values: (values.len() < MAX_LISTED_VALUES).then(|| values.into_iter().collect()),
            nulls,
        })
        .collect();

    info!("investigating {}:", label);
    for r in &reports {
        match &r.values {
            Some(values) => info!(
                "the number of values for feature {}: {} -- {:?}",
                r.column, r.distinct, values
            ),
            None => info!("the number of values for feature {}: {}", r.column, r.distinct),
        }
    }
    info!("null value counts:");
    for r in &reports {
        info!("{} {}", r.column, r.nulls);
    }

    reports
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_investigate_lists_small_columns() {
        let headers = vec!["status".to_string(), "id".to_string()];
        let rows: Vec<Vec<String>> = (0..20)
            .map(|i| vec![if i % 2 == 0 { "a" } else { "" }.to_string(), i.to_string()])
            .collect();

        let reports = investigate("test", &headers, &rows);

        assert_eq!(reports[0].distinct, 2);
        assert_eq!(
            reports[0].values,
            Some(vec!["".to_string(), "a".to_string()])
        );
        assert_eq!(reports[0].nulls, 10);

        assert_eq!(reports[1].distinct, 20);
        assert_eq!(reports[1].values, None);
        assert_eq!(reports[1].nulls, 0);
    }

    #[test]
    fn test_values_listed_below_twelve_only() {
        let headers = vec!["eleven".to_string(), "twelve".to_string()];
        let rows: Vec<Vec<String>> = (0..24)
            .map(|i| vec![(i % 11).to_string(), (i % 12).to_string()])
            .collect();

        let reports = investigate("boundary", &headers, &rows);

        assert_eq!(reports[0].distinct, 11);
        assert_eq!(reports[0].values.as_ref().map(Vec::len), Some(11));
        assert_eq!(reports[1].distinct, 12);
        assert_eq!(reports[1].values, None);
    }
}
