use super::*;

#[test]
fn defaults_are_valid() {
    let cfg = EngineConfig::default();
    assert_eq!(cfg.data_dir, PathBuf::from("data"));
    assert_eq!(cfg.flusher_threads, 8);
    assert_eq!(cfg.compaction, CompactionStyle::Leveled);
    assert_eq!(cfg.compaction_period, Duration::from_secs(1));
    assert_eq!(cfg.compaction_timeout, Duration::from_secs(60));
    assert!(cfg.validate().is_ok());
}

#[test]
fn builder_overrides_fields() {
    let cfg = EngineConfig::new("/tmp/levelkv")
        .with_flush_threshold(1024)
        .with_flusher_threads(2)
        .with_compaction(CompactionStyle::Flat)
        .with_compaction_period(Duration::from_millis(50));

    assert_eq!(cfg.data_dir, PathBuf::from("/tmp/levelkv"));
    assert_eq!(cfg.flush_threshold_bytes, 1024);
    assert_eq!(cfg.flusher_threads, 2);
    assert_eq!(cfg.compaction, CompactionStyle::Flat);
    assert_eq!(cfg.compaction_period, Duration::from_millis(50));
    // untouched fields keep their defaults
    assert_eq!(cfg.target_table_size_bytes, DEFAULT_TARGET_TABLE_SIZE);
}

#[test]
fn validate_rejects_zero_values() {
    let cfg = EngineConfig::default().with_flush_threshold(0);
    assert_eq!(cfg.validate(), Err(ConfigError::Zero("flush_threshold_bytes")));

    let cfg = EngineConfig::default().with_flusher_threads(0);
    assert_eq!(cfg.validate(), Err(ConfigError::Zero("flusher_threads")));

    let cfg = EngineConfig::default().with_target_table_size(0);
    assert_eq!(cfg.validate(), Err(ConfigError::Zero("target_table_size_bytes")));
}

#[test]
fn flat_mode_ignores_leveled_settings() {
    let cfg = EngineConfig::default()
        .with_compaction(CompactionStyle::Flat)
        .with_compaction_threshold(0)
        .with_compaction_period(Duration::ZERO);
    assert!(cfg.validate().is_ok());
}

#[test]
fn compaction_style_parses_case_insensitively() {
    assert_eq!("flat".parse::<CompactionStyle>(), Ok(CompactionStyle::Flat));
    assert_eq!(" Leveled ".parse::<CompactionStyle>(), Ok(CompactionStyle::Leveled));
    assert_eq!(
        "tiered".parse::<CompactionStyle>(),
        Err(ConfigError::UnknownStyle("tiered".to_string()))
    );
}

// The only test in this crate that mutates process environment.
#[test]
fn from_env_reads_levelkv_variables() {
    std::env::set_var("LEVELKV_DATA_DIR", "/var/lib/levelkv");
    std::env::set_var("LEVELKV_FLUSH_KB", "2");
    std::env::set_var("LEVELKV_COMPACTION", "flat");
    std::env::set_var("LEVELKV_FLUSHER_THREADS", "not-a-number");

    let cfg = EngineConfig::from_env();

    std::env::remove_var("LEVELKV_DATA_DIR");
    std::env::remove_var("LEVELKV_FLUSH_KB");
    std::env::remove_var("LEVELKV_COMPACTION");
    std::env::remove_var("LEVELKV_FLUSHER_THREADS");

    assert_eq!(cfg.data_dir, PathBuf::from("/var/lib/levelkv"));
    assert_eq!(cfg.flush_threshold_bytes, 2048);
    assert_eq!(cfg.compaction, CompactionStyle::Flat);
    assert_eq!(cfg.flusher_threads, DEFAULT_FLUSHER_THREADS);
}
