use anyhow::{anyhow, Result};
use std::io::BufRead;

/// 引物 scheme BED 行：前 4 列为标准 BED，第 5 列为引物池，第 6 列为链方向。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BedRecord {
    pub chrom: String,
    pub start: usize,
    pub end: usize,
    pub name: String,
    pub pool: String,
    pub strand: Option<char>,
}

pub struct BedReader<R: BufRead> {
    reader: R,
    buf: String,
    line: usize,
    done: bool,
}

impl<R: BufRead> BedReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader, buf: String::new(), line: 0, done: false }
    }

    pub fn next_record(&mut self) -> Result<Option<BedRecord>> {
        if self.done {
            return Ok(None);
        }

        loop {
            self.buf.clear();
            let n = self.reader.read_line(&mut self.buf)?;
            if n == 0 {
                self.done = true;
                return Ok(None);
            }
            self.line += 1;

            let text = self.buf.trim_end();
            // skip blank lines, comments and track/browser headers
            if text.is_empty()
                || text.starts_with('#')
                || text.starts_with("track")
                || text.starts_with("browser")
            {
                continue;
            }

            let fields: Vec<&str> = text.split('\t').collect();
            if fields.len() < 5 {
                return Err(anyhow!(
                    "BED line {}: expected at least 5 columns (chrom start end name pool), found {}",
                    self.line,
                    fields.len()
                ));
            }

            let start: usize = fields[1]
                .parse()
                .map_err(|_| anyhow!("BED line {}: invalid start '{}'", self.line, fields[1]))?;
            let end: usize = fields[2]
                .parse()
                .map_err(|_| anyhow!("BED line {}: invalid end '{}'", self.line, fields[2]))?;

            let strand = match fields.get(5).copied() {
                Some("+") => Some('+'),
                Some("-") => Some('-'),
                Some(other) => {
                    return Err(anyhow!(
                        "BED line {}: invalid strand '{}'",
                        self.line,
                        other
                    ))
                }
                None => None,
            };

            return Ok(Some(BedRecord {
                chrom: fields[0].to_string(),
                start,
                end,
                name: fields[3].to_string(),
                pool: fields[4].to_string(),
                strand,
            }));
        }
    }

    /// 读取剩余所有记录。
    pub fn read_all(&mut self) -> Result<Vec<BedRecord>> {
        let mut records = Vec::new();
        while let Some(rec) = self.next_record()? {
            records.push(rec);
        }
        Ok(records)
    }
}
