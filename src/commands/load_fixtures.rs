//! Bulk loading of reference data from headerless two-column CSV files.
//!
//! Ingredients are read as `name,measurement_unit` rows and tags as `name,slug` rows. Rows that
//! already exist are left alone, so a file can be loaded repeatedly. A file is loaded in a single
//! transaction: one bad row means nothing is written.

use csv::{ReaderBuilder, Trim};
use sea_orm::{DatabaseConnection, DbErr, TransactionTrait};
use std::path::Path;
use thiserror::Error;
use tracing::info;

use crate::db::services::{ingredient_service, tag_service};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Failed to read CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("Row {row}: expected 2 non-empty columns")]
    MalformedRow { row: usize },
    #[error("Database error: {0}")]
    Db(#[from] DbErr),
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub created: usize,
    pub existing: usize,
}

impl ImportSummary {
    fn record(&mut self, created: bool) {
        if created {
            self.created += 1;
        } else {
            self.existing += 1;
        }
    }
}

fn read_pairs(path: &Path) -> Result<Vec<(String, String)>, ImportError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(Trim::All)
        .from_path(path)?;

    let mut pairs = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let record = result?;
        let row = index + 1;
        match (record.len(), record.get(0), record.get(1)) {
            (2, Some(first), Some(second)) if !first.is_empty() && !second.is_empty() => {
                pairs.push((first.to_string(), second.to_string()));
            }
            _ => return Err(ImportError::MalformedRow { row }),
        }
    }
    Ok(pairs)
}

pub async fn load_ingredients(db: &DatabaseConnection, path: &Path) -> Result<ImportSummary, ImportError> {
    let rows = read_pairs(path)?;
    let txn = db.begin().await?;
    let mut summary = ImportSummary::default();
    for (name, measurement_unit) in &rows {
        let (_, created) = ingredient_service::get_or_create_ingredient(&txn, name, measurement_unit).await?;
        summary.record(created);
    }
    txn.commit().await?;
    info!(
        path = %path.display(),
        created = summary.created,
        existing = summary.existing,
        "Ingredients loaded."
    );
    Ok(summary)
}

pub async fn load_tags(db: &DatabaseConnection, path: &Path) -> Result<ImportSummary, ImportError> {
    let rows = read_pairs(path)?;
    let txn = db.begin().await?;
    let mut summary = ImportSummary::default();
    for (name, slug) in &rows {
        let (_, created) = tag_service::get_or_create_tag(&txn, name, slug).await?;
        summary.record(created);
    }
    txn.commit().await?;
    info!(
        path = %path.display(),
        created = summary.created,
        existing = summary.existing,
        "Tags loaded."
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::entities::prelude::{Ingredient, Tag};
    use crate::db::test_support;
    use sea_orm::{EntityTrait, PaginatorTrait};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn csv_file(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[tokio::test]
    async fn test_load_ingredients_is_repeatable() {
        let db = test_support::setup().await;
        test_support::ingredient(&db, "salt", "g").await;
        let file = csv_file("salt,g\nflour, g\n\"eggs, large\",pcs\n");

        let first = load_ingredients(&db, file.path()).await.unwrap();
        assert_eq!(first, ImportSummary { created: 2, existing: 1 });
        let second = load_ingredients(&db, file.path()).await.unwrap();
        assert_eq!(second, ImportSummary { created: 0, existing: 3 });
        assert_eq!(Ingredient::find().count(&db).await.unwrap(), 3);

        let flour = ingredient_service::search_ingredients(&db, Some("flour")).await.unwrap();
        assert_eq!(flour[0].measurement_unit, "g");
    }

    #[tokio::test]
    async fn test_malformed_row_writes_nothing() {
        let db = test_support::setup().await;
        let file = csv_file("Breakfast,breakfast\nLunch\n");

        let err = load_tags(&db, file.path()).await.unwrap_err();
        assert!(matches!(err, ImportError::MalformedRow { row: 2 }));
        assert_eq!(Tag::find().count(&db).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_load_tags_matches_by_slug() {
        let db = test_support::setup().await;
        test_support::tag(&db, "Morning", "breakfast").await;
        let file = csv_file("Breakfast,breakfast\nDinner,dinner\n");

        let summary = load_tags(&db, file.path()).await.unwrap();
        assert_eq!(summary, ImportSummary { created: 1, existing: 1 });
        let tags = tag_service::list_tags(&db).await.unwrap();
        assert!(tags.iter().any(|t| t.slug == "breakfast" && t.name == "Morning"));
    }
}
