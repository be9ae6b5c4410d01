//! Runs the `matepair pair` command on small hit tables

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

const HITS: &str = "\
# ref\tread\tarm\tstrand\tstart\tlen\tscore
chr2\t7\t1\t+\t0\t100\t40
chr1\t1\t1\t+\t100\t100\t30
chr1\t1\t2\t-\t300\t100\t30
chr1\t2\t1\t+\t500\t100\t5
chr1\t2\t2\t-\t600\t100\t30
chr2\t7\t2\t-\t150\t100\t40
";

fn get_matepair_binary() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_matepair") {
        return PathBuf::from(path);
    }

    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let candidates = [
        manifest_dir.join("target/release/matepair"),
        manifest_dir.join("target/debug/matepair"),
    ];
    for path in &candidates {
        if path.exists() {
            return path.clone();
        }
    }

    PathBuf::from("matepair")
}

fn run_matepair(work_dir: &Path, args: &[&str]) -> std::io::Result<std::process::Output> {
    Command::new(get_matepair_binary())
        .current_dir(work_dir)
        .args(args)
        .output()
}

fn write_hits(dir: &Path) -> std::io::Result<PathBuf> {
    let path = dir.join("hits.tsv");
    fs::write(&path, HITS)?;
    Ok(path)
}

#[test]
fn test_pair_writes_pairs_and_stats() -> std::io::Result<()> {
    let temp_dir = TempDir::new()?;
    let work_dir = temp_dir.path();
    write_hits(work_dir)?;

    let output = run_matepair(
        work_dir,
        &[
            "pair", "-i", "hits.tsv", "-o", "pairs.tsv", "-f", "500", "-s", "10",
            "--stats-json", "stats.json", "--paranoid", "-t", "2",
        ],
    )?;
    assert!(
        output.status.success(),
        "matepair failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let pairs = fs::read_to_string(work_dir.join("pairs.tsv"))?;
    let lines: Vec<&str> = pairs.lines().collect();
    assert_eq!(
        lines,
        vec![
            "chr1\t1\t100\t+\t300\t-\t2\t300\t30\t30",
            "chr2\t7\t0\t+\t150\t-\t2\t250\t40\t40",
        ]
    );

    let stats: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(work_dir.join("stats.json"))?)?;
    assert_eq!(stats["total"]["total_hits"], 6);
    assert_eq!(stats["total"]["total_pairs"], 2);
    assert_eq!(stats["total"]["sequences_seen"], 2);
    assert_eq!(stats["references"][0]["reference"], "chr1");
    assert_eq!(stats["references"][1]["reference"], "chr2");
    Ok(())
}

#[test]
fn test_unfiltered_keeps_low_scoring_pairs() -> std::io::Result<()> {
    let temp_dir = TempDir::new()?;
    let work_dir = temp_dir.path();
    write_hits(work_dir)?;

    let output = run_matepair(
        work_dir,
        &["pair", "-i", "hits.tsv", "-f", "500", "-s", "10", "--unfiltered"],
    )?;
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let reads: Vec<&str> = stdout
        .lines()
        .map(|line| line.split('\t').nth(1).unwrap())
        .collect();
    assert_eq!(reads, vec!["1", "2", "7"]);
    Ok(())
}

#[test]
fn test_hit_status_reports_unmated_hits() -> std::io::Result<()> {
    let temp_dir = TempDir::new()?;
    let work_dir = temp_dir.path();
    let mut hits = HITS.to_string();
    hits.push_str("chr1\t9\t1\t+\t50\t100\t30\n");
    fs::write(work_dir.join("hits.tsv"), hits)?;

    let output = run_matepair(
        work_dir,
        &[
            "pair", "-i", "hits.tsv", "-o", "pairs.tsv", "-f", "500", "--unfiltered",
            "--hit-status", "status.tsv",
        ],
    )?;
    assert!(
        output.status.success(),
        "matepair failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let statuses = fs::read_to_string(work_dir.join("status.tsv"))?;
    let lines: Vec<&str> = statuses.lines().collect();
    assert_eq!(
        lines,
        vec![
            "chr1\t9\t1\t+\t50\t0",
            "chr1\t1\t1\t+\t100\t1",
            "chr1\t1\t2\t-\t300\t1",
            "chr1\t2\t1\t+\t500\t1",
            "chr1\t2\t2\t-\t600\t1",
            "chr2\t7\t1\t+\t0\t1",
            "chr2\t7\t2\t-\t150\t1",
        ]
    );

    // statuses only exist in unfiltered mode
    let output = run_matepair(
        work_dir,
        &["pair", "-i", "hits.tsv", "--hit-status", "status.tsv"],
    )?;
    assert!(!output.status.success());
    Ok(())
}

#[test]
fn test_bgzf_input() -> std::io::Result<()> {
    let temp_dir = TempDir::new()?;
    let work_dir = temp_dir.path();
    {
        let file = File::create(work_dir.join("hits.tsv.gz"))?;
        let mut writer = noodles::bgzf::io::Writer::new(file);
        writer.write_all(HITS.as_bytes())?;
    }

    let output = run_matepair(work_dir, &["pair", "-i", "hits.tsv.gz", "-f", "500"])?;
    assert!(
        output.status.success(),
        "matepair failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(String::from_utf8_lossy(&output.stdout).lines().count(), 3);
    Ok(())
}

#[test]
fn test_bad_input_fails() -> std::io::Result<()> {
    let temp_dir = TempDir::new()?;
    let work_dir = temp_dir.path();
    write_hits(work_dir)?;

    let output = run_matepair(work_dir, &["pair", "-i", "hits.tsv", "--orientation", "up"])?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Unknown orientation"));

    fs::write(work_dir.join("broken.tsv"), "chr1\t1\t3\t+\t10\t100\n")?;
    let output = run_matepair(work_dir, &["pair", "-i", "broken.tsv"])?;
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("line 1"));

    let output = run_matepair(
        work_dir,
        &["pair", "-i", "hits.tsv", "--min-fragment", "600", "-f", "500"],
    )?;
    assert!(!output.status.success());
    Ok(())
}
