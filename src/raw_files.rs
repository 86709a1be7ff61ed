use anyhow::{Context, Result};
use csv::{ReaderBuilder, StringRecord, Trim};
use indicatif::{ProgressBar, ProgressStyle};
use polars::prelude::{CsvWriter, DataFrame, SerWriter};
use regex::Regex;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use walkdir::WalkDir;
use zip::ZipArchive;

/// One CSV table read from disk or from inside a ZIP archive.
pub struct RawCsv {
    pub source: String,
    pub headers: StringRecord,
    pub records: Vec<StringRecord>,
}

impl RawCsv {
    /// Index of the first header matching any of `names`, ignoring case and spaces.
    pub fn column(&self, names: &[&str]) -> Option<usize> {
        self.headers.iter().position(|h| {
            let h = normalize_header(h);
            names.iter().any(|n| normalize_header(n) == h)
        })
    }
}

fn normalize_header(header: &str) -> String {
    header
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_')
        .collect::<String>()
        .to_lowercase()
}

fn posting_date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|[._\-])((?:19|20)\d{2})(\d{2})(\d{2})")
            .expect("posting stamp pattern is valid")
    })
}

fn year_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:^|[^\d])((?:19|20)\d{2})(?:[^\d]|$)").expect("year pattern is valid")
    })
}

/// Posting stamp `YYYYMMDD` embedded in ERCOT file names, e.g.
/// `cdr.00012331.0000000000000000.20240823.123456789.DAMSPNP4190.zip`.
pub fn extract_posting_stamp(filename: &str) -> Option<u32> {
    let caps = posting_date_regex().captures(filename)?;
    let stamp = format!("{}{}{}", &caps[1], &caps[2], &caps[3]);
    stamp.parse().ok()
}

/// Year from an ERCOT posting stamp, or from a bare four-digit year.
pub fn extract_year_from_filename(filename: &str) -> Option<i32> {
    if let Some(stamp) = extract_posting_stamp(filename) {
        return Some((stamp / 10_000) as i32);
    }
    let caps = year_regex().captures(filename)?;
    caps[1].parse().ok()
}

/// Recursively find CSV files and ZIP archives under `dir`. XML archives are
/// skipped. Files are ordered by posting stamp so later postings come last.
pub fn discover_raw_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        anyhow::bail!("{} is not a directory", dir.display());
    }

    let mut files: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|path| {
            let name = file_name(path).to_lowercase();
            (name.ends_with(".csv") || name.ends_with(".zip")) && !name.contains("_xml")
        })
        .collect();

    files.sort_by_key(|path| (extract_posting_stamp(&file_name(path)).unwrap_or(0), path.clone()));
    Ok(files)
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Read a raw CSV file, or every CSV inside a ZIP archive (nested archives
/// included).
pub fn read_raw_file(path: &Path) -> Result<Vec<RawCsv>> {
    let is_zip = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("zip"))
        .unwrap_or(false);

    if is_zip {
        let file = fs::File::open(path)
            .with_context(|| format!("Failed to open ZIP file: {:?}", path))?;
        read_zip(file, &file_name(path))
    } else {
        let bytes = fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
        Ok(vec![parse_csv(&bytes, file_name(path))?])
    }
}

fn read_zip<R: Read + std::io::Seek>(reader: R, source: &str) -> Result<Vec<RawCsv>> {
    let mut archive = ZipArchive::new(reader)
        .with_context(|| format!("Failed to read ZIP archive: {}", source))?;

    let mut tables = Vec::new();
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        if entry.is_dir() {
            continue;
        }
        let name = entry.name().to_string();
        let lower = name.to_lowercase();
        if lower.contains("_xml") {
            continue;
        }

        let mut bytes = Vec::new();
        entry.read_to_end(&mut bytes)?;
        let entry_source = format!("{}:{}", source, name);
        if lower.ends_with(".csv") {
            tables.push(parse_csv(&bytes, entry_source)?);
        } else if lower.ends_with(".zip") {
            tables.extend(read_zip(std::io::Cursor::new(bytes), &entry_source)?);
        }
    }
    Ok(tables)
}

fn parse_csv(bytes: &[u8], source: String) -> Result<RawCsv> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .flexible(true)
        .from_reader(bytes);
    let headers = reader
        .headers()
        .with_context(|| format!("Failed to read headers of {}", source))?
        .clone();
    let records = reader
        .records()
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to parse {}", source))?;
    Ok(RawCsv {
        source,
        headers,
        records,
    })
}

pub fn progress_bar(len: usize) -> Result<ProgressBar> {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?,
    );
    Ok(pb)
}

pub fn repeated_flag(repeated: bool) -> &'static str {
    if repeated {
        "Y"
    } else {
        "N"
    }
}

/// Write a processed table with its header row.
pub fn write_csv(path: &Path, df: &mut DataFrame) -> Result<()> {
    let mut file = fs::File::create(path).with_context(|| format!("creating {}", path.display()))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .finish(df)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}
