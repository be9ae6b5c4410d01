//! Tab-separated hit input and pair output
//!
//! Hit lines carry `ref_name, read_id, arm(1|2), strand(+|-), start,
//! read_len[, score]`. Input may be plain text or BGZF-compressed
//! (`.gz`/`.bgz`); `-` reads standard input.

use crate::hit::HitKey;
use crate::pair_window::MatedPair;
use crate::policy::HitStatus;
use log::debug;
use noodles::bgzf;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Error as IoError, Read, Seek, SeekFrom, Write};
use std::num::ParseIntError;

#[derive(Debug)]
pub enum ParseErr {
    NotEnoughFields,
    IoError(IoError),
    InvalidField(ParseIntError),
    InvalidArm,
    InvalidStrand,
    InvalidFormat(String),
}

impl std::fmt::Display for ParseErr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseErr::NotEnoughFields => write!(f, "Not enough fields in hit record"),
            ParseErr::IoError(e) => write!(f, "IO error: {}", e),
            ParseErr::InvalidField(e) => write!(f, "Invalid field: {}", e),
            ParseErr::InvalidArm => write!(f, "Invalid arm (expected 1 or 2)"),
            ParseErr::InvalidStrand => write!(f, "Invalid strand"),
            ParseErr::InvalidFormat(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for ParseErr {}

/// One hit as read from the input table
#[derive(Debug, Clone, PartialEq)]
pub struct HitLine {
    pub reference: String,
    pub read_id: u32,
    pub arm: bool,
    pub reverse_complement: bool,
    pub start: i64,
    pub read_length: i64,
    pub score: Option<i32>,
}

pub fn parse_hit_line(line: &str) -> Result<HitLine, ParseErr> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 6 {
        return Err(ParseErr::NotEnoughFields);
    }

    let reference = fields[0].to_string();
    if reference.is_empty() {
        return Err(ParseErr::InvalidFormat("Empty reference name".to_string()));
    }
    let read_id = fields[1].parse::<u32>().map_err(ParseErr::InvalidField)?;
    let arm = match fields[2] {
        "1" => false,
        "2" => true,
        _ => return Err(ParseErr::InvalidArm),
    };
    let reverse_complement = match fields[3] {
        "+" => false,
        "-" => true,
        _ => return Err(ParseErr::InvalidStrand),
    };
    let start = fields[4].parse::<i64>().map_err(ParseErr::InvalidField)?;
    let read_length = fields[5].parse::<i64>().map_err(ParseErr::InvalidField)?;
    if read_length <= 0 {
        return Err(ParseErr::InvalidFormat(format!(
            "Read length must be positive, got {}",
            read_length
        )));
    }
    let score = match fields.get(6) {
        Some(field) if !field.is_empty() => {
            Some(field.parse::<i32>().map_err(ParseErr::InvalidField)?)
        }
        _ => None,
    };

    Ok(HitLine {
        reference,
        read_id,
        arm,
        reverse_complement,
        start,
        read_length,
        score,
    })
}

/// Read every hit, skipping blank lines and `#` comments
pub fn read_hits<R: BufRead>(reader: R) -> Result<Vec<HitLine>, (usize, ParseErr)> {
    let mut hits = Vec::new();
    for (line_number, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| (line_number + 1, ParseErr::IoError(e)))?;
        let trimmed = line.trim_end_matches('\r');
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        hits.push(parse_hit_line(trimmed).map_err(|e| (line_number + 1, e))?);
    }
    Ok(hits)
}

const BGZF_HEADER_SIZE: usize = 18;

/// Check whether a file starts with a valid BGZF header.
fn is_bgzf<R: Read + Seek>(reader: &mut R) -> io::Result<bool> {
    let mut header = [0u8; BGZF_HEADER_SIZE];
    let result = match reader.read_exact(&mut header) {
        Ok(()) => Ok(header[0..2] == [0x1f, 0x8b]
            && header[2] == 0x08
            && header[3] == 0x04
            && header[12..14] == [b'B', b'C']),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    };
    reader.seek(SeekFrom::Start(0))?;
    result
}

/// Open a hit table and parse it completely
pub fn read_hits_file(path: &str) -> io::Result<Vec<HitLine>> {
    let reader: Box<dyn BufRead> = if path == "-" {
        Box::new(BufReader::new(io::stdin()))
    } else if [".gz", ".bgz"].iter().any(|e| path.ends_with(e)) {
        let mut file = File::open(path)
            .map_err(|e| io::Error::new(e.kind(), format!("Failed to open '{}': {}", path, e)))?;
        if !is_bgzf(&mut file)? {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "'{}' is regular gzip, not BGZF. Convert with: zcat '{}' | bgzip > hits.tsv.gz",
                    path, path
                ),
            ));
        }
        debug!("Reading BGZF-compressed hits from {}", path);
        Box::new(bgzf::io::Reader::new(file))
    } else {
        let file = File::open(path)
            .map_err(|e| io::Error::new(e.kind(), format!("Failed to open '{}': {}", path, e)))?;
        Box::new(BufReader::new(file))
    };

    read_hits(reader).map_err(|(line_number, e)| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("Failed to parse hits from {} at line {}: {}", path, line_number, e),
        )
    })
}

fn strand(reverse_complement: bool) -> char {
    if reverse_complement {
        '-'
    } else {
        '+'
    }
}

fn score_field(score: Option<i32>) -> String {
    score.map_or_else(|| ".".to_string(), |s| s.to_string())
}

/// `ref, read_id, left_pos, left_strand, right_pos, right_strand, right_arm, fragment_length, left_score, right_score`
pub fn format_pair(reference: &str, pair: &MatedPair) -> String {
    format!(
        "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
        reference,
        pair.read_id,
        pair.left_pos,
        strand(pair.left_rc),
        pair.right_pos,
        strand(pair.right_rc),
        if pair.arm_of_right { 2 } else { 1 },
        pair.fragment_length,
        score_field(pair.cached_scores.0),
        score_field(pair.cached_scores.1)
    )
}

pub fn write_pairs<W: Write>(out: &mut W, reference: &str, pairs: &[MatedPair]) -> io::Result<()> {
    for pair in pairs {
        writeln!(out, "{}", format_pair(reference, pair))?;
    }
    Ok(())
}

/// `ref, read_id, arm, strand, start, mate_count`
pub fn format_hit_status(reference: &str, hit: &HitKey, status: &HitStatus) -> String {
    format!(
        "{}\t{}\t{}\t{}\t{}\t{}",
        reference,
        hit.read_id,
        if hit.arm { 2 } else { 1 },
        strand(hit.reverse_complement),
        hit.template_start,
        status.mate_count
    )
}

pub fn write_hit_statuses<W: Write>(
    out: &mut W,
    reference: &str,
    statuses: &[(HitKey, HitStatus)],
) -> io::Result<()> {
    for (hit, status) in statuses {
        writeln!(out, "{}", format_hit_status(reference, hit, status))?;
    }
    Ok(())
}
