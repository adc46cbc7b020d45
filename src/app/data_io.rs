use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use chrono::Local;
use tracing::error;

use super::types::{DataFormat, ResultRecord};

/// Reads seed addresses, one per line. A missing file yields no seeds.
pub fn load_seeds(path: &str) -> io::Result<Vec<String>> {
    if !Path::new(path).exists() {
        error!(path = %path, "seed file not found");
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(ToString::to_string)
        .collect())
}

pub struct CsvSink {
    writer: csv::Writer<File>,
}

impl CsvSink {
    fn new(output_path: &str) -> io::Result<Self> {
        let file = File::create(output_path)?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        writer.write_record(RESULT_HEADERS)?;
        Ok(Self { writer })
    }

    fn write_record(&mut self, record: &ResultRecord) -> io::Result<()> {
        self.writer.serialize(record)?;
        Ok(())
    }

    fn finalize(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

pub struct JsonSink {
    file: File,
    first: bool,
    closed: bool,
}

impl JsonSink {
    fn new(output_path: &str) -> io::Result<Self> {
        let mut file = File::create(output_path)?;
        file.write_all(b"[\n")?;
        Ok(Self {
            file,
            first: true,
            closed: false,
        })
    }

    fn write_record(&mut self, record: &ResultRecord) -> io::Result<()> {
        if !self.first {
            self.file.write_all(b",\n")?;
        }
        self.first = false;
        serde_json::to_writer(&mut self.file, record).map_err(io::Error::other)?;
        Ok(())
    }

    fn finalize(&mut self) -> io::Result<()> {
        if !self.closed {
            if self.first {
                self.file.write_all(b"]\n")?;
            } else {
                self.file.write_all(b"\n]\n")?;
            }
            self.closed = true;
        }
        self.file.flush()
    }
}

impl Drop for JsonSink {
    fn drop(&mut self) {
        let _ = self.finalize();
    }
}

const RESULT_HEADERS: [&str; 6] = ["Keyword", "Link", "Findings", "Link Response", "Date", "Time"];

pub enum ResultSink {
    Csv(CsvSink),
    Json(JsonSink),
}

impl ResultSink {
    pub fn new(output_path: &str, format: DataFormat) -> io::Result<Self> {
        match format {
            DataFormat::Csv => Ok(ResultSink::Csv(CsvSink::new(output_path)?)),
            DataFormat::Json => Ok(ResultSink::Json(JsonSink::new(output_path)?)),
        }
    }

    pub fn write_all(&mut self, records: &[ResultRecord]) -> io::Result<()> {
        for record in records {
            match self {
                ResultSink::Csv(sink) => sink.write_record(record)?,
                ResultSink::Json(sink) => sink.write_record(record)?,
            }
        }
        Ok(())
    }

    pub fn finalize(&mut self) -> io::Result<()> {
        match self {
            ResultSink::Csv(sink) => sink.finalize(),
            ResultSink::Json(sink) => sink.finalize(),
        }
    }
}

/// Append-only list of discovered restricted addresses, one per line.
pub struct DiscoveryFile {
    file: File,
}

impl DiscoveryFile {
    pub fn open(path: &str) -> io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }

    pub fn append(&mut self, url: &str) -> io::Result<()> {
        self.file.write_all(url.as_bytes())?;
        self.file.write_all(b"\n")?;
        self.file.flush()
    }
}

pub fn detect_data_format(path: &str, fallback: DataFormat) -> DataFormat {
    let lower = path.to_ascii_lowercase();
    if lower.ends_with(".json") {
        DataFormat::Json
    } else if lower.ends_with(".csv") {
        DataFormat::Csv
    } else {
        fallback
    }
}

pub fn default_results_path(format: DataFormat) -> String {
    let ts = Local::now().format("%Y-%m-%d_%H-%M-%S");
    match format {
        DataFormat::Csv => format!("monitoring_results_{ts}.csv"),
        DataFormat::Json => format!("monitoring_results_{ts}.json"),
    }
}

pub fn default_found_links_path() -> String {
    let ts = Local::now().format("%Y-%m-%d_%H-%M-%S");
    format!("found_links_{ts}.txt")
}
