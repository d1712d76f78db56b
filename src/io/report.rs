use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;

/// 每条输入记录在报告里的一行：匹配、剪切与去留的全部依据，
/// 足以让下游把成对 read 对账。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub name: String,
    pub chrom: String,
    pub start: usize,
    pub end: usize,
    pub left_primer: Option<String>,
    pub left_distance: Option<i64>,
    pub right_primer: Option<String>,
    pub right_distance: Option<i64>,
    pub left_masked: usize,
    pub right_masked: usize,
    pub amplicon: Option<String>,
    pub correctly_paired: bool,
    pub status: &'static str,
}

const REPORT_HEADER: &str = "read_name\tchrom\tstart\tend\tleft_primer\tleft_distance\t\
right_primer\tright_distance\tleft_masked\tright_masked\tamplicon\tcorrectly_paired\tstatus";

pub struct ReportWriter<'a> {
    out: Box<dyn Write + 'a>,
}

impl ReportWriter<'static> {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::create(path)
            .with_context(|| format!("cannot create report file '{}'", path.display()))?;
        Self::from_writer(Box::new(std::io::BufWriter::new(file)))
    }
}

impl<'a> ReportWriter<'a> {
    pub fn from_writer(mut out: Box<dyn Write + 'a>) -> Result<Self> {
        writeln!(out, "{REPORT_HEADER}")?;
        Ok(Self { out })
    }

    pub fn write_row(&mut self, row: &ReportRow) -> Result<()> {
        let opt_name = |name: &Option<String>| name.clone().unwrap_or_else(|| "NA".to_string());
        let opt_dist = |d: &Option<i64>| d.map_or_else(|| "NA".to_string(), |d| d.to_string());

        writeln!(
            self.out,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            row.name,
            row.chrom,
            row.start,
            row.end,
            opt_name(&row.left_primer),
            opt_dist(&row.left_distance),
            opt_name(&row.right_primer),
            opt_dist(&row.right_distance),
            row.left_masked,
            row.right_masked,
            opt_name(&row.amplicon),
            row.correctly_paired,
            row.status,
        )?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<()> {
        self.out.flush()?;
        Ok(())
    }
}

/// 扩增子平均深度报告：chrom、扩增子编号、插入区间上的平均覆盖。
pub fn write_amplicon_depths<W: Write>(mut out: W, rows: &[(String, String, f64)]) -> Result<()> {
    writeln!(out, "chrom\tamplicon\tmean_depth")?;
    for (chrom, amplicon, depth) in rows {
        writeln!(out, "{chrom}\t{amplicon}\t{depth:.2}")?;
    }
    out.flush()?;
    Ok(())
}
