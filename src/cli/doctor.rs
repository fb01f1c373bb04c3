//! CLI `doctor` command: run database and index diagnostics and print a health report.

use anyhow::{Context, Result};

use mnemos::config::MnemosConfig;
use mnemos::db;
use mnemos::embedding::FACE_EMBEDDING_DIM;
use mnemos::index::{IdIndex, IndexFiles, Metric};

pub fn doctor(config: &MnemosConfig) -> Result<()> {
    let db_path = config.resolved_db_path();
    let data_dir = config.resolved_data_dir();

    if !db_path.exists() {
        println!("Database: not found at {}", db_path.display());
        println!("Run `mnemos remember <text>` to initialize.");
        return Ok(());
    }

    let file_size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);
    let conn = db::open_database(&db_path).context("failed to open database (may be corrupt)")?;
    let report = db::check_database_health(&conn).context("failed to run health check")?;

    println!("Mnemos Health Report");
    println!("====================");
    println!();
    println!("Database:          {}", db_path.display());
    println!("File size:         {}", format_bytes(file_size));
    println!("Schema version:    {}", report.schema_version);
    println!();
    println!("Embedding model:");
    println!("  Stored:          {}", report.embedding_model.as_deref().unwrap_or("(not set)"));
    println!("  Configured:      {}", config.embedding.model);
    if let Some(ref stored) = report.embedding_model {
        if stored != &config.embedding.model {
            println!("  WARNING: model mismatch! Run `mnemos rebuild` to re-embed memories.");
        } else {
            println!("  Status:          OK (match)");
        }
    }
    println!();
    println!("Row counts:");
    println!("  Memories:        {}", report.memory_count);
    println!("  Documents:       {}", report.document_count);
    println!("  Faces:           {}", report.face_count);
    println!("  Labeled clusters: {}", report.labeled_cluster_count);
    println!();

    // Text vectors are checked against the stored row count only; their
    // dimension depends on the model, which doctor does not load.
    let text_files = IndexFiles::in_dir(&data_dir, "text");
    match std::fs::read_to_string(&text_files.ids) {
        Ok(raw) => match serde_json::from_str::<Vec<i64>>(&raw) {
            Ok(ids) => println!("Text index:        {} vectors", ids.len()),
            Err(e) => println!("Text index:        CORRUPT ({e})"),
        },
        Err(_) => println!("Text index:        not built"),
    }
    let face_files = IndexFiles::in_dir(&data_dir, "faces");
    match IdIndex::<String>::load(&face_files, FACE_EMBEDDING_DIM, Metric::InnerProduct) {
        Ok(index) => println!("Face index:        {} vectors", index.len()),
        Err(e) => println!("Face index:        {e}"),
    }
    println!();

    if report.integrity_ok {
        println!("Integrity check:   PASSED");
    } else {
        println!("Integrity check:   FAILED ({})", report.integrity_details);
        println!();
        println!("Recovery steps:");
        println!("  1. Restore from a backup: cp backup.db {}", db_path.display());
        println!("  2. Then run `mnemos rebuild` to regenerate the text index.");
    }

    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
