/// Integration tests for the LevelKV CLI.
/// Each test drives the real binary over stdin and inspects stdout.
use std::fs;
use std::path::Path;
use tempfile::tempdir;

/// Runs the CLI against `data_dir` with `commands` on stdin (plus a trailing
/// EXIT) and returns stdout.
fn run_cli(data_dir: &Path, compaction: &str, commands: &str) -> String {
    use std::io::Write;
    use std::process::{Command, Stdio};

    let mut child = Command::new(env!("CARGO_BIN_EXE_cli"))
        .env("LEVELKV_DATA_DIR", data_dir)
        .env("LEVELKV_FLUSH_KB", "1") // 1 KiB so small scripts trigger flushes
        .env("LEVELKV_FLUSHER_THREADS", "2")
        .env("LEVELKV_COMPACTION", compaction)
        .env("LEVELKV_COMPACTION_KB", "4")
        .env("LEVELKV_TABLE_KB", "1")
        .env("LEVELKV_COMPACTION_PERIOD_MS", "50")
        .env("RUST_LOG", "warn")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn CLI");

    {
        let stdin = child.stdin.as_mut().expect("Failed to open stdin");
        stdin
            .write_all(commands.as_bytes())
            .expect("Failed to write to stdin");
        stdin.write_all(b"EXIT\n").expect("Failed to write EXIT");
    }

    let output = child.wait_with_output().expect("Failed to read output");
    assert!(output.status.success(), "cli exited with {}", output.status);
    String::from_utf8_lossy(&output.stdout).to_string()
}

/// Output lines with the "> " prompts stripped, banner excluded.
fn replies(output: &str) -> Vec<String> {
    output
        .lines()
        .skip(3)
        .map(|l| l.trim_start_matches("> ").to_string())
        .filter(|l| !l.is_empty())
        .collect()
}

fn db_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".db"))
        .collect();
    names.sort();
    names
}

#[test]
fn test_basic_put_get() {
    let dir = tempdir().unwrap();
    let output = run_cli(dir.path(), "leveled", "PUT key1 value1\nGET key1\n");

    assert_eq!(replies(&output), vec!["OK", "value1", "bye"]);
}

#[test]
fn test_banner_names_directory() {
    let dir = tempdir().unwrap();
    let output = run_cli(dir.path(), "flat", "");

    let banner = output.lines().next().unwrap();
    assert!(banner.starts_with("LevelKV started"));
    assert!(banner.contains(&dir.path().display().to_string()));
    assert!(banner.contains("Flat"));
}

#[test]
fn test_set_alias_and_multiword_value() {
    let dir = tempdir().unwrap();
    let output = run_cli(dir.path(), "leveled", "SET greeting hello there world\nGET greeting\n");

    assert_eq!(replies(&output), vec!["OK", "hello there world", "bye"]);
}

#[test]
fn test_overwrite_and_delete() {
    let dir = tempdir().unwrap();
    let commands = "PUT k old\nPUT k new\nGET k\nDEL k\nGET k\n";
    let output = run_cli(dir.path(), "leveled", commands);

    assert_eq!(replies(&output), vec!["OK", "OK", "new", "OK", "(nil)", "bye"]);
}

#[test]
fn test_usage_errors() {
    let dir = tempdir().unwrap();
    let commands = "PUT onlykey\nGET\nDEL\nRANGE a\nFROB\n";
    let output = run_cli(dir.path(), "leveled", commands);

    assert_eq!(
        replies(&output),
        vec![
            "ERR usage: PUT key value",
            "ERR usage: GET key",
            "ERR usage: DEL key",
            "ERR usage: RANGE from to",
            "unknown command: FROB",
            "bye"
        ]
    );
}

#[test]
fn test_scan_and_range() {
    let dir = tempdir().unwrap();
    let mut commands = String::new();
    for i in 0..10 {
        commands.push_str(&format!("PUT key{:02} value{}\n", i, i));
    }
    commands.push_str("DEL key05\n");
    commands.push_str("SCAN key07\n");
    commands.push_str("RANGE key03 key07\n");
    commands.push_str("RANGE x y\n");

    let output = run_cli(dir.path(), "leveled", &commands);
    let lines = replies(&output);
    let tail: Vec<&str> = lines[11..].iter().map(|s| s.as_str()).collect();

    assert_eq!(
        tail,
        vec![
            "key07 -> value7",
            "key08 -> value8",
            "key09 -> value9",
            "(3 entries)",
            "key03 -> value3",
            "key04 -> value4",
            "key06 -> value6",
            "(3 entries)",
            "(empty)",
            "bye"
        ]
    );
}

#[test]
fn test_flush_writes_table_file() {
    let dir = tempdir().unwrap();
    let output = run_cli(dir.path(), "flat", "PUT a 1\nPUT b 2\nFLUSH\nGET a\n");

    assert!(output.contains("OK (tables=1)"));
    assert_eq!(db_files(dir.path()), vec!["0.db"]);
}

#[test]
fn test_auto_flush_keeps_everything_readable() {
    let dir = tempdir().unwrap();
    let mut commands = String::new();
    for i in 0..100 {
        commands.push_str(&format!("PUT key{:03} value_with_some_data_{}\n", i, i));
    }
    commands.push_str("SCAN\n");

    let output = run_cli(dir.path(), "leveled", &commands);

    assert!(output.contains("key000 -> value_with_some_data_0"));
    assert!(output.contains("key099 -> value_with_some_data_99"));
    assert!(output.contains("(100 entries)"));
    assert!(!db_files(dir.path()).is_empty());
}

#[test]
fn test_compact_in_both_styles() {
    for style in ["flat", "leveled"] {
        let dir = tempdir().unwrap();
        let mut commands = String::new();
        for batch in 0..3 {
            for i in 0..5 {
                commands.push_str(&format!("PUT batch{}_key{} val{}\n", batch, i, batch * 10 + i));
            }
            commands.push_str("FLUSH\n");
        }
        commands.push_str("DEL batch0_key0\n");
        commands.push_str("FLUSH\nCOMPACT\n");
        for batch in 0..3 {
            for i in 0..5 {
                commands.push_str(&format!("GET batch{}_key{}\n", batch, i));
            }
        }

        let output = run_cli(dir.path(), style, &commands);
        let lines = replies(&output);

        assert!(
            lines.iter().any(|l| l.starts_with("OK (tables=")),
            "{}: {:?}",
            style,
            lines
        );
        let gets = &lines[lines.len() - 16..lines.len() - 1];
        assert_eq!(gets[0], "(nil)", "{}", style);
        assert_eq!(gets[1], "val1", "{}", style);
        assert_eq!(gets[14], "val24", "{}", style);
    }
}

#[test]
fn test_stats_output() {
    let dir = tempdir().unwrap();
    let output = run_cli(dir.path(), "leveled", "PUT x 1\nPUT y 2\nFLUSH\nSTATS\n");

    assert!(output.contains("table_count:     1"));
    assert!(output.contains("memtable_count:  0"));
    assert!(output.contains("compaction:      Leveled"));
}

#[test]
fn test_quit_command() {
    let dir = tempdir().unwrap();
    let output = run_cli(dir.path(), "leveled", "PUT foo bar\nQUIT\nGET foo\n");

    assert_eq!(replies(&output), vec!["OK", "bye"]);
}

#[test]
fn test_persistence_across_restarts() {
    for style in ["flat", "leveled"] {
        let dir = tempdir().unwrap();

        // no FLUSH: EXIT closes the engine, which flushes
        run_cli(dir.path(), style, "PUT persist_key persist_value\nPUT gone x\nDEL gone\n");

        let output = run_cli(dir.path(), style, "GET persist_key\nGET gone\n");
        assert_eq!(replies(&output), vec!["persist_value", "(nil)", "bye"], "{}", style);
    }
}

#[test]
fn test_large_value() {
    let dir = tempdir().unwrap();
    let large_value = "x".repeat(5000);
    let commands = format!("PUT large_key {}\nGET large_key\n", large_value);
    let output = run_cli(dir.path(), "leveled", &commands);

    assert!(replies(&output).contains(&large_value));
}

#[test]
fn test_mixed_operations_stress() {
    let dir = tempdir().unwrap();
    let mut commands = String::new();
    for i in 0..200 {
        match i % 4 {
            0 => commands.push_str(&format!("PUT stress_k{:03} stress_v{}\n", i, i)),
            1 => commands.push_str(&format!("GET stress_k{:03}\n", i - 1)),
            2 => commands.push_str(&format!("DEL stress_k{:03}\n", i - 2)),
            _ => commands.push_str("COMPACT\n"),
        }
    }
    commands.push_str("SCAN\n");

    let output = run_cli(dir.path(), "leveled", &commands);

    // every PUT was deleted two commands later
    assert!(output.contains("(empty)"));
    assert!(output.contains("stress_v0"));
}
