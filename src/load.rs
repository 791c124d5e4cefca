//! Load pipeline: chunk files of a dump into target tables.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use dump_catalog::{CatalogStore, FilesystemStore, RowSetEntry};
use migrator_core::{
    dialect_resolver, parse_time_zone, CodecOptions, ColumnDescriptor, ColumnMetadata, Connection,
    ConnectionFactory, Dialect, Format, RowCodec, RowReader, TypeCatalog,
};
use tracing::{info, warn};

use crate::config::LoadOptions;
use crate::formats::FormatRegistry;
use crate::job::JobContext;

/// Totals of a load run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub row_sets: usize,
    pub rows_written: u64,
    pub rows_skipped: u64,
    pub commits: u64,
}

struct RowSetLoader<'a> {
    options: &'a LoadOptions,
    dialect: &'a dyn Dialect,
    catalog: &'a TypeCatalog,
    format: &'a dyn Format,
    codec_options: CodecOptions,
    input_dir: &'a Path,
}

/// Match the columns of a container header to the target table's columns by
/// name, case-insensitively.
fn bind_columns(
    table: &str,
    header: &[ColumnDescriptor],
    target: &[ColumnMetadata],
) -> anyhow::Result<Vec<ColumnMetadata>> {
    header
        .iter()
        .map(|column| {
            target
                .iter()
                .find(|t| t.name.eq_ignore_ascii_case(&column.name))
                .cloned()
                .with_context(|| format!("Table {table} has no column named {}", column.name))
        })
        .collect()
}

impl RowSetLoader<'_> {
    async fn load(
        &self,
        conn: &mut dyn Connection,
        row_set: &RowSetEntry,
        ctx: &JobContext,
        summary: &mut LoadSummary,
    ) -> anyhow::Result<()> {
        let table = row_set.target_table();
        let target_columns = conn
            .table_columns(table)
            .await
            .with_context(|| format!("Failed to read columns of target table {table}"))?;
        let columns = bind_columns(table, &row_set.columns, &target_columns)?;
        let codec = RowCodec::bind(self.catalog, &columns, self.codec_options)
            .with_context(|| format!("Failed to bind codecs for table {table}"))?;

        let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
        let sql = self.dialect.insert_statement(table, &names, self.options.replace);
        let mut strategy = self.options.commit.strategy(sql, self.options.batch_size);

        for chunk in &row_set.chunks {
            ctx.checkpoint().await?;
            let path = self.input_dir.join(&chunk.file);
            let file = File::open(&path)
                .with_context(|| format!("Failed to open chunk file {}", path.display()))?;
            let mut reader = self.format.reader(Box::new(BufReader::new(file)));

            let header = reader.read_header()?;
            let matches = header.len() == row_set.columns.len()
                && header
                    .iter()
                    .zip(&row_set.columns)
                    .all(|(h, c)| h.name == c.name && h.variant_type == c.variant_type);
            if !matches {
                anyhow::bail!("Header of {} does not match the catalog", path.display());
            }

            let mut rows = RowReader::new(reader, codec.clone());
            while let Some(params) = rows
                .next_params()
                .with_context(|| format!("Failed to read {}", path.display()))?
            {
                strategy.execute_row(conn, params).await?;
            }
            summary.rows_skipped += rows.rows_skipped();
            if rows.rows_read() != chunk.row_count {
                if !self.options.lenient {
                    anyhow::bail!(
                        "{} holds {} rows, catalog lists {}",
                        chunk.file,
                        rows.rows_read(),
                        chunk.row_count
                    );
                }
                warn!(
                    "{} holds {} rows, catalog lists {}",
                    chunk.file,
                    rows.rows_read(),
                    chunk.row_count
                );
            }
        }
        strategy.finish(conn).await?;

        info!(
            "Loaded {} rows into {} in {} commits",
            strategy.rows_written(),
            table,
            strategy.commits()
        );
        summary.row_sets += 1;
        summary.rows_written += strategy.rows_written();
        summary.commits += strategy.commits();
        Ok(())
    }
}

/// Load every row set of the dump in `options.input_dir`.
///
/// Batches already committed stay in place when a later row fails.
pub async fn run_load(
    options: &LoadOptions,
    factory: Arc<dyn ConnectionFactory>,
    formats: &FormatRegistry,
    ctx: &JobContext,
) -> anyhow::Result<LoadSummary> {
    let catalog = FilesystemStore::new(&options.input_dir)
        .read_catalog()
        .await?
        .with_context(|| {
            format!(
                "No catalog in {}; the dump is missing or incomplete",
                options.input_dir.display()
            )
        })?;
    let format = formats.get(&catalog.format)?;
    let time_zone = parse_time_zone(options.time_zone.as_deref().unwrap_or(&catalog.time_zone))?;
    info!(
        "Loading dump of {} taken at {} ({} rows)",
        catalog.source,
        catalog.created_at,
        catalog.total_rows()
    );

    let mut conn = factory
        .connect()
        .await
        .context("Failed to connect to the target database")?;
    let dialect = dialect_resolver().resolve(conn.signature())?;
    if options.replace && !dialect.supports_replace() {
        warn!("The {} dialect has no REPLACE; rows are inserted", dialect.name());
    }
    let type_catalog = dialect.type_catalog();
    let loader = RowSetLoader {
        options,
        dialect: dialect.as_ref(),
        catalog: &type_catalog,
        format: format.as_ref(),
        codec_options: CodecOptions::default()
            .with_time_zone(time_zone)
            .lenient(options.lenient),
        input_dir: &options.input_dir,
    };

    conn.begin().await?;
    let mut summary = LoadSummary::default();
    for row_set in &catalog.row_sets {
        ctx.checkpoint().await?;
        if let Err(e) = loader.load(conn.as_mut(), row_set, ctx, &mut summary).await {
            if let Err(rollback) = conn.rollback().await {
                warn!("Rollback failed: {}", rollback);
            }
            return Err(e.context(format!("Failed to load row set {}", row_set.name)));
        }
    }
    info!(
        "Load completed: {} rows written, {} skipped",
        summary.rows_written, summary.rows_skipped
    );
    Ok(summary)
}
