//! Integration tests for EXPLAIN and EXPLAIN ANALYZE functionality.

use anyhow::Result;
use database::{Database, QueryResult};

#[test]
fn explain_analyze_select_query() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let mut db = Database::new(temp_dir.path(), "catalog.json", "test.wal", 10)?;

    // Create table and insert test data
    db.execute("CREATE TABLE users (id INT PRIMARY KEY, name TEXT, age INT)")?;
    db.execute("INSERT INTO users VALUES (1, 'Alice', 30)")?;
    db.execute("INSERT INTO users VALUES (2, 'Bob', 25)")?;

    // Run EXPLAIN ANALYZE
    let result = db
        .execute("EXPLAIN ANALYZE SELECT * FROM users WHERE age > 20")?;

    // Verify we get rows back (the explain output)
    match result {
        QueryResult::Rows { schema, rows } => {
            assert_eq!(schema, vec!["Explain"]);
            assert!(!rows.is_empty());

            // Check that the output contains timing and row count information
            let explain_output = &rows[0].values[0];
            let output_str = format!("{:?}", explain_output);

            // Verify key statistics are present
            assert!(output_str.contains("EXPLAIN ANALYZE") || output_str.contains("Execution"));
            assert!(output_str.contains("Total rows") || output_str.contains("rows"));
        }
        _ => panic!("Expected Rows result from EXPLAIN ANALYZE"),
    }

    Ok(())
}

#[test]
fn explain_select_query_without_execution() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let mut db = Database::new(temp_dir.path(), "catalog.json", "test.wal", 10)?;

    // Create table (no data needed since we're not executing)
    db.execute("CREATE TABLE users (id INT PRIMARY KEY, name TEXT)")?;

    // Run EXPLAIN (without ANALYZE)
    let result = db.execute("EXPLAIN SELECT * FROM users")?;

    // Verify we get rows back
    match result {
        QueryResult::Rows { schema, rows } => {
            assert_eq!(schema, vec!["Explain"]);
            assert!(!rows.is_empty());

            // EXPLAIN should show the plan but not execution stats
            let explain_output = &rows[0].values[0];
            let output_str = format!("{:?}", explain_output);

            // Should contain plan information
            assert!(output_str.contains("SeqScan") || output_str.contains("Plan"));
        }
        _ => panic!("Expected Rows result from EXPLAIN"),
    }

    Ok(())
}

#[test]
fn explain_analyze_insert_query() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let mut db = Database::new(temp_dir.path(), "catalog.json", "test.wal", 10)?;

    // Create table
    db.execute("CREATE TABLE products (id INT PRIMARY KEY, name TEXT)")?;

    // Run EXPLAIN ANALYZE on INSERT
    let result = db
        .execute("EXPLAIN ANALYZE INSERT INTO products VALUES (1, 'Widget')")?;

    // Verify we get explain output
    match result {
        QueryResult::Rows { rows, .. } => {
            assert!(!rows.is_empty());
            let output_str = format!("{:?}", rows[0].values[0]);
            assert!(output_str.contains("EXPLAIN") || output_str.contains("Insert"));
        }
        _ => panic!("Expected Rows result from EXPLAIN ANALYZE INSERT"),
    }

    // Verify the insert actually executed
    let result = db.execute("SELECT * FROM products")?;
    match result {
        QueryResult::Rows { rows, .. } => {
            assert_eq!(rows.len(), 1, "INSERT should have executed");
        }
        _ => panic!("Expected rows from SELECT"),
    }

    Ok(())
}

#[test]
fn explain_analyze_with_filter_shows_stats() -> Result<()> {
    let temp_dir = tempfile::tempdir()?;
    let mut db = Database::new(temp_dir.path(), "catalog.json", "test.wal", 10)?;

    // Create table and insert multiple rows
    db.execute("CREATE TABLE numbers (id INT PRIMARY KEY, value INT)")?;

    for i in 1..=10 {
        db.execute(&format!("INSERT INTO numbers VALUES ({}, {})", i, i * 10))?;
    }

    // Run EXPLAIN ANALYZE with a filter
    let result = db
        .execute("EXPLAIN ANALYZE SELECT * FROM numbers WHERE value > 50")?;

    match result {
        QueryResult::Rows { rows, .. } => {
            assert!(!rows.is_empty());
            let output_str = format!("{:?}", rows[0].values[0]);

            // Should show execution happened
            assert!(output_str.contains("Total rows") || output_str.contains("5"));
        }
        _ => panic!("Expected Rows result"),
    }

    Ok(())
}
