use std::fs;
use std::path::{Path, PathBuf};

use curator_core::{ClassificationError, CuratorConfig, CuratorError, load_catalog, parse_catalog};
use curator_dedup::{AuditLog, MatchRule, RunOptions, Tier, restore, run, scan, validate};
use tempfile::TempDir;

fn record_js(title: &str, description: &str, icon: Option<&str>) -> String {
    let icon_line = icon
        .map(|icon| format!(",\n            icon: \"{icon}\""))
        .unwrap_or_default();
    format!(
        "        {{\n            title: \"{title}\",\n            description: \"{description}\",\n            category: \"community\",\n            impact: \"Lasting change\",\n            beneficiaries: \"10K+ people\"{icon_line}\n        }}"
    )
}

fn page(records: &[String], count: usize) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<body>\n<div class=\"stats\"><span class=\"stat-number\" id=\"totalCount\">{count}</span> initiatives</div>\n<script>\n    const initiatives = [\n{}\n    ];\n    renderCards(initiatives);\n</script>\n<footer>Made with care</footer>\n</body>\n</html>\n",
        records.join(",\n")
    )
}

fn write_page(dir: &TempDir, contents: &str) -> PathBuf {
    let path = dir.path().join("index.html");
    fs::write(&path, contents).unwrap();
    path
}

fn files_in(dir: &Path) -> usize {
    fs::read_dir(dir).unwrap().count()
}

fn water_tank_page() -> String {
    page(
        &[
            record_js("Water Tank Support", "Install water tanks in villages.", Some("tint")),
            record_js("Textbook Exchange", "Swap used textbooks between students.", Some("book")),
            record_js("  water   tank SUPPORT", "Install water tanks in villages.", Some("tint")),
        ],
        3,
    )
}

fn near_duplicate_page() -> String {
    page(
        &[
            record_js("Community Water Tanks", "Tanks.", Some("tint")),
            record_js(
                "Community Water Tank",
                "Shared storage tanks for drought-hit villages.",
                Some("tint"),
            ),
            record_js("Textbook Exchange", "Swap used textbooks between students.", Some("book")),
        ],
        3,
    )
}

fn bicycle_page() -> String {
    page(
        &[
            record_js("Bicycle Bank", "Lend bicycles to students in rural areas.", Some("bicycle")),
            record_js("Mobile Clinic", "Doctors visit remote hamlets weekly.", Some("ambulance")),
            record_js("Bike Repair Workshops", "Teach youth to fix and maintain bikes.", Some("wrench")),
            record_js("Cycle to School Scheme", "Subsidised cycles for girls attending school.", Some("school")),
            record_js("Bicycle Ambulance Network", "Stretcher bikes for emergency transport.", Some("ambulance")),
            record_js("Girls Bicycle Library", "Borrowable bicycles stocked at village libraries.", Some("book")),
        ],
        6,
    )
}

#[test]
fn exact_duplicate_is_removed_and_count_updated() {
    let dir = TempDir::new().unwrap();
    let original = water_tank_page();
    let path = write_page(&dir, &original);
    let config = CuratorConfig::default();

    let report = run(&path, &config, &RunOptions::default()).unwrap();
    assert_eq!(report.before_count, 3);
    assert_eq!(report.after_count, 2);
    assert_eq!(report.display_count_before, Some(3));
    assert!(report.written);
    assert_eq!(report.entries.len(), 1);
    assert_eq!(report.entries[0].rule, MatchRule::ExactSignature);
    assert_eq!(report.entries[0].dropped.position, 2);
    assert_eq!(report.entries[0].record.title, "  water   tank SUPPORT");

    let catalog = load_catalog(&path, &config.container).unwrap();
    let titles: Vec<&str> = catalog.entries.iter().map(|e| e.record.title.as_str()).collect();
    assert_eq!(titles, vec!["Water Tank Support", "Textbook Exchange"]);
    assert_eq!(catalog.display_count(), Some(2));

    let backup = report.backup_path.unwrap();
    assert_eq!(fs::read_to_string(backup).unwrap(), original);

    let log = AuditLog::new(report.audit_path.unwrap());
    let logged = log.load().unwrap();
    assert_eq!(logged.len(), 1);
    assert_eq!(logged[0].run_id, report.run_id);
}

#[test]
fn missing_field_aborts_without_touching_anything() {
    let dir = TempDir::new().unwrap();
    let original = page(
        &[
            record_js("Water Tank Support", "Install water tanks in villages.", Some("tint")),
            record_js("Water Tank Support", "Install water tanks in villages.", Some("tint")),
            record_js("Bicycle Bank", "Lend bicycles to students.", None),
        ],
        3,
    );
    let path = write_page(&dir, &original);

    let err = run(&path, &CuratorConfig::default(), &RunOptions::default()).unwrap_err();
    assert!(matches!(
        err,
        CuratorError::Classification(ClassificationError::MissingField {
            position: 2,
            field: "icon",
            ..
        })
    ));
    assert_eq!(err.exit_code() as i32, 4);
    assert_eq!(fs::read_to_string(&path).unwrap(), original);
    assert_eq!(files_in(dir.path()), 1);
}

#[test]
fn bicycle_cap_removes_the_excess() {
    let dir = TempDir::new().unwrap();
    let path = write_page(&dir, &bicycle_page());
    let mut config = CuratorConfig::default();
    config.policy.thematic_caps.insert("bicycle".into(), 2);

    let report = run(&path, &config, &RunOptions::default()).unwrap();
    assert_eq!(report.removed(), 3);
    assert!(report.entries.iter().all(|e| e.rule == MatchRule::ThematicCap
        && e.tier == Tier::Thematic
        && e.theme.as_deref() == Some("bicycle")));

    let catalog = load_catalog(&path, &config.container).unwrap();
    assert_eq!(catalog.len(), 3);
    assert_eq!(catalog.display_count(), Some(3));
}

#[test]
fn second_run_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let path = write_page(&dir, &water_tank_page());
    let config = CuratorConfig::default();

    run(&path, &config, &RunOptions::default()).unwrap();
    let after_first = fs::read_to_string(&path).unwrap();
    let files_after_first = files_in(dir.path());

    let second = run(&path, &config, &RunOptions::default()).unwrap();
    assert!(second.entries.is_empty());
    assert!(!second.written);
    assert_eq!(second.before_count, second.after_count);
    assert_eq!(fs::read_to_string(&path).unwrap(), after_first);
    assert_eq!(files_in(dir.path()), files_after_first);
}

#[test]
fn counts_stay_consistent() {
    let dir = TempDir::new().unwrap();
    let path = write_page(&dir, &near_duplicate_page());
    let config = CuratorConfig::default();

    let report = run(&path, &config, &RunOptions::default()).unwrap();
    assert_eq!(report.after_count, report.before_count - report.entries.len());

    let catalog = load_catalog(&path, &config.container).unwrap();
    assert_eq!(catalog.len(), report.after_count);
    assert!(catalog.count_in_sync());
}

#[test]
fn survivors_are_untouched_and_in_order() {
    let dir = TempDir::new().unwrap();
    let original = near_duplicate_page();
    let before = parse_catalog(original.as_str(), &Default::default()).unwrap();
    let path = write_page(&dir, &original);

    run(&path, &CuratorConfig::default(), &RunOptions::default()).unwrap();

    let after = load_catalog(&path, &Default::default()).unwrap();
    assert_eq!(after.records(), vec![before.entries[1].record.clone(), before.entries[2].record.clone()]);
}

#[test]
fn text_outside_block_and_count_is_byte_identical() {
    let dir = TempDir::new().unwrap();
    let original = water_tank_page();
    let before = parse_catalog(original.as_str(), &Default::default()).unwrap();
    let path = write_page(&dir, &original);

    run(&path, &CuratorConfig::default(), &RunOptions::default()).unwrap();

    let written = fs::read_to_string(&path).unwrap();
    let after = parse_catalog(written.as_str(), &Default::default()).unwrap();

    let (old_site, new_site) = (&before.count_sites[0], &after.count_sites[0]);
    assert_eq!(original[..old_site.span.start], written[..new_site.span.start]);
    assert_eq!(
        original[old_site.span.end..before.block.start],
        written[new_site.span.end..after.block.start]
    );
    assert_eq!(original[before.block.end..], written[after.block.end..]);
}

#[test]
fn clean_catalog_is_not_rewritten() {
    let dir = TempDir::new().unwrap();
    let original = page(
        &[
            record_js("Water Tank Support", "Install water tanks in villages.", Some("tint")),
            record_js("Textbook Exchange", "Swap used textbooks between students.", Some("book")),
        ],
        2,
    );
    let path = write_page(&dir, &original);

    let report = run(&path, &CuratorConfig::default(), &RunOptions::default()).unwrap();
    assert!(!report.written);
    assert!(report.backup_path.is_none());
    assert_eq!(fs::read_to_string(&path).unwrap(), original);
    assert_eq!(files_in(dir.path()), 1);
}

#[test]
fn stale_count_is_repaired_without_audit_entries() {
    let dir = TempDir::new().unwrap();
    let original = page(
        &[record_js("Water Tank Support", "Install water tanks in villages.", Some("tint"))],
        7,
    );
    let path = write_page(&dir, &original);

    let report = run(&path, &CuratorConfig::default(), &RunOptions::default()).unwrap();
    assert!(report.written);
    assert!(report.entries.is_empty());
    assert!(report.audit_path.is_none());

    let catalog = load_catalog(&path, &Default::default()).unwrap();
    assert_eq!(catalog.display_count(), Some(1));
}

#[test]
fn scan_reports_without_writing() {
    let dir = TempDir::new().unwrap();
    let original = bicycle_page();
    let path = write_page(&dir, &original);
    let mut config = CuratorConfig::default();
    config.policy.thematic_caps.insert("bicycle".into(), 4);

    let report = scan(&path, &config).unwrap();
    assert!(report.dry_run);
    assert!(!report.written);
    assert_eq!(report.removed(), 1);
    let bicycle = report.census.iter().find(|c| c.theme == "bicycle").unwrap();
    assert_eq!((bicycle.before, bicycle.after, bicycle.cap), (5, 4, Some(4)));

    assert_eq!(fs::read_to_string(&path).unwrap(), original);
    assert_eq!(files_in(dir.path()), 1);
}

#[test]
fn validate_reports_count_sync() {
    let dir = TempDir::new().unwrap();
    let path = write_page(&dir, &water_tank_page());
    let report = validate(&path, &CuratorConfig::default()).unwrap();
    assert_eq!(report.records, 3);
    assert_eq!(report.display_count, Some(3));
    assert!(report.count_in_sync);

    let stale = write_page(&dir, &page(&[record_js("A", "B", Some("c"))], 5));
    assert!(!validate(&stale, &CuratorConfig::default()).unwrap().count_in_sync);
}

#[test]
fn restore_reinserts_after_survivor() {
    let dir = TempDir::new().unwrap();
    let path = write_page(&dir, &near_duplicate_page());
    let config = CuratorConfig::default();

    let report = run(&path, &config, &RunOptions::default()).unwrap();
    let entry = report.entries[0].clone();
    assert_eq!(entry.rule, MatchRule::NearTitle);

    let restored = restore(&path, &config, &entry.short_id(), None).unwrap();
    assert_eq!(restored.before_count, 2);
    assert_eq!(restored.after_count, 3);
    assert_eq!(restored.restored.position, 1);

    let catalog = load_catalog(&path, &config.container).unwrap();
    assert_eq!(catalog.len(), 3);
    assert_eq!(catalog.entries[1].record, entry.record);
    assert_eq!(restored.restored.line, catalog.entries[1].line);
    assert_eq!(catalog.display_count(), Some(3));

    let again = restore(&path, &config, &entry.id.to_string(), None).unwrap_err();
    assert!(matches!(again, CuratorError::RecordAlreadyPresent(_)));
}

#[test]
fn restoring_an_identical_copy_is_refused() {
    let dir = TempDir::new().unwrap();
    let copy = record_js("Water Tank Support", "Install water tanks in villages.", Some("tint"));
    let path = write_page(&dir, &page(&[copy.clone(), copy], 2));
    let config = CuratorConfig::default();

    let report = run(&path, &config, &RunOptions::default()).unwrap();
    let written = fs::read_to_string(&path).unwrap();

    let err = restore(&path, &config, &report.entries[0].id.to_string(), None).unwrap_err();
    assert!(matches!(err, CuratorError::RecordAlreadyPresent(_)));
    assert_eq!(fs::read_to_string(&path).unwrap(), written);
}

#[test]
fn unknown_audit_entry_is_not_found() {
    let dir = TempDir::new().unwrap();
    let path = write_page(&dir, &water_tank_page());
    let err = restore(&path, &CuratorConfig::default(), "0123abcd", None).unwrap_err();
    assert!(matches!(err, CuratorError::AuditEntryNotFound(_)));
    assert_eq!(err.exit_code() as i32, 2);
}

#[test]
fn unbalanced_array_is_a_parse_error() {
    let dir = TempDir::new().unwrap();
    let original = water_tank_page().replace("    ];", "    ;");
    let path = write_page(&dir, &original);

    let err = run(&path, &CuratorConfig::default(), &RunOptions::default()).unwrap_err();
    assert!(matches!(err, CuratorError::Parse(_)));
    assert_eq!(fs::read_to_string(&path).unwrap(), original);
}
