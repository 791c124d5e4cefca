//! Dump pipeline: source tables and queries to chunk files plus a catalog.

use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use dump_catalog::{
    chunk_file_name, CatalogStore, ChunkEntry, DumpCatalog, FileStems, FilesystemStore, RowSetEntry,
};
use migrator_core::{
    dialect_resolver, parse_time_zone, CodecOptions, ColumnDescriptor, ConnectionFactory, Format,
    LookaheadCursor, QuerySplit, QuerySplitter, RowCodec, TypeCatalog, WRITE_BUFFER_SIZE,
};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::DumpOptions;
use crate::formats::FormatRegistry;
use crate::job::JobContext;

/// What a chunk worker reports back.
struct ChunkOutcome {
    row_set: usize,
    entry: ChunkEntry,
    columns: Vec<ColumnDescriptor>,
}

/// Everything a chunk worker needs, owned so the worker can run on its own task.
#[derive(Clone)]
struct ChunkJob {
    factory: Arc<dyn ConnectionFactory>,
    catalog: Arc<TypeCatalog>,
    format: Arc<dyn Format>,
    codec_options: CodecOptions,
    output_dir: PathBuf,
}

impl ChunkJob {
    async fn run(self, row_set: usize, split: QuerySplit, file: String) -> anyhow::Result<ChunkOutcome> {
        let mut conn = self.factory.connect().await?;
        let mut cursor = LookaheadCursor::new(split.open(conn.as_mut()).await?);
        let codec = RowCodec::bind(&self.catalog, cursor.columns(), self.codec_options)?;
        let expected = split.limit.map_or(0, |limit| limit.count);
        if expected > 0 && !cursor.has_next().await? {
            warn!(
                "Split {} expected {} rows but the source returned none; it changed during the dump",
                split.index, expected
            );
        }
        let columns = codec.descriptors();

        let path = self.output_dir.join(&file);
        let sink = File::create(&path)
            .with_context(|| format!("Failed to create chunk file {}", path.display()))?;
        let mut writer = self
            .format
            .writer(Box::new(BufWriter::with_capacity(WRITE_BUFFER_SIZE, sink)));
        writer.write_header(&columns)?;

        let mut row_count = 0u64;
        while let Some(row) = cursor.next().await? {
            let values = codec.encode_row(&row)?;
            writer.write_row(&values)?;
            row_count += 1;
        }
        writer.finish()?;
        debug!("Wrote {} rows to {}", row_count, path.display());

        Ok(ChunkOutcome {
            row_set,
            entry: ChunkEntry {
                index: split.index,
                file,
                row_count,
                offset: split.limit.map_or(0, |limit| limit.offset),
            },
            columns,
        })
    }
}

fn record(row_sets: &mut [RowSetEntry], outcome: ChunkOutcome) {
    let entry = &mut row_sets[outcome.row_set];
    if outcome.entry.index == 0 {
        entry.columns = outcome.columns;
    }
    entry.chunks.push(outcome.entry);
}

/// Dump every requested table and query into `options.output_dir`.
///
/// Splits are extracted by up to `options.threads` workers, each on its own
/// connection. The catalog is written once every chunk file is complete.
pub async fn run_dump(
    options: &DumpOptions,
    factory: Arc<dyn ConnectionFactory>,
    formats: &FormatRegistry,
    ctx: &JobContext,
) -> anyhow::Result<DumpCatalog> {
    let format = formats.get(&options.format)?;
    let time_zone = parse_time_zone(&options.time_zone)?;

    let mut conn = factory
        .connect()
        .await
        .context("Failed to connect to the source database")?;
    let signature = conn.signature().clone();
    let dialect = dialect_resolver().resolve(&signature)?;
    info!("Dumping from {} using the {} dialect", signature, dialect.name());

    std::fs::create_dir_all(&options.output_dir).with_context(|| {
        format!("Failed to create output directory {}", options.output_dir.display())
    })?;

    let job = ChunkJob {
        factory: factory.clone(),
        catalog: Arc::new(dialect.type_catalog()),
        format: format.clone(),
        codec_options: CodecOptions::default().with_time_zone(time_zone),
        output_dir: options.output_dir.clone(),
    };

    let mut row_sets: Vec<(RowSetEntry, String)> = options
        .tables
        .iter()
        .map(|table| (RowSetEntry::for_table(table), dialect.table_query(table)))
        .collect();
    row_sets.extend(
        options
            .queries
            .iter()
            .map(|q| (RowSetEntry::for_query(&q.name, &q.sql), q.sql.clone())),
    );

    let mut workers: JoinSet<anyhow::Result<ChunkOutcome>> = JoinSet::new();
    let mut entries: Vec<RowSetEntry> = Vec::with_capacity(row_sets.len());
    let mut stems = FileStems::new();
    for (index, (entry, sql)) in row_sets.into_iter().enumerate() {
        info!("Dumping row set {}", entry.name);
        let name = entry.name.clone();
        let stem = stems.allocate(&name);
        entries.push(entry);
        let mut splitter = QuerySplitter::new(dialect.clone(), sql, Vec::new())
            .with_chunk_size(options.chunk_size)
            .with_binding_mode(options.binding);

        loop {
            ctx.checkpoint().await?;
            let Some(split) = splitter
                .next_split(conn.as_mut())
                .await
                .with_context(|| format!("Failed to split row set {name}"))?
            else {
                break;
            };
            while workers.len() >= options.threads {
                if let Some(done) = workers.join_next().await {
                    record(&mut entries, done.context("Dump worker panicked")??);
                }
            }
            let file = chunk_file_name(&stem, split.index, format.extension());
            workers.spawn(job.clone().run(index, split, file));
        }
    }
    while let Some(done) = workers.join_next().await {
        record(&mut entries, done.context("Dump worker panicked")??);
    }
    drop(conn);

    let mut catalog = DumpCatalog::new(format.name(), signature, &options.time_zone);
    for entry in entries {
        info!(
            "Row set {}: {} rows in {} chunks",
            entry.name,
            entry.row_count(),
            entry.chunks.len()
        );
        catalog.add_row_set(entry);
    }
    FilesystemStore::new(&options.output_dir)
        .write_catalog(&catalog)
        .await?;
    info!("Dump completed: {} rows", catalog.total_rows());
    Ok(catalog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use migrator_core::dialect::GenericDialect;
    use migrator_core::{sql_types, ColumnMetadata, MemoryDatabase, SqlValue};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_split_emptied_by_source_writes_empty_chunk() {
        let db = MemoryDatabase::new();
        let columns = vec![ColumnMetadata::new("id", sql_types::INTEGER)];
        let rows = (0..10).map(|i| vec![SqlValue::Int(i)]).collect();
        db.create_table("t", columns.clone(), rows);

        let mut conn = db.connect();
        let mut splitter = QuerySplitter::new(Arc::new(GenericDialect), "SELECT * FROM t", Vec::new())
            .with_chunk_size(Some(5));
        splitter.next_split(&mut conn).await.unwrap().unwrap();
        let second = splitter.next_split(&mut conn).await.unwrap().unwrap();
        db.create_table("t", columns, Vec::new());

        let dir = TempDir::new().unwrap();
        let job = ChunkJob {
            factory: Arc::new(db),
            catalog: Arc::new(TypeCatalog::standard()),
            format: FormatRegistry::standard().get("csv").unwrap(),
            codec_options: CodecOptions::default(),
            output_dir: dir.path().to_path_buf(),
        };
        let outcome = job.run(0, second, "t.1.csv".to_string()).await.unwrap();
        assert_eq!(outcome.entry.row_count, 0);
        assert_eq!(outcome.entry.offset, 5);
        assert_eq!(outcome.columns.len(), 1);
        assert!(dir.path().join("t.1.csv").exists());
    }
}
