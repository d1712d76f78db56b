use std::collections::BTreeMap;

use anyhow::{Context, Result};
use log::{debug, info};
use noodles::bam;
use noodles::sam;
use noodles::sam::alignment::io::Write as AlignmentWrite;
use noodles::sam::alignment::record::data::field::Tag;
use noodles::sam::alignment::record_buf::data::field::Value;
use noodles::sam::alignment::RecordBuf;
use noodles::sam::header::record::value::map::{program::tag as program_tag, Program, ReadGroup};
use noodles::sam::header::record::value::Map;
use rayon::prelude::*;

use crate::io::report::{ReportRow, ReportWriter};
use crate::scheme::PrimerScheme;

pub mod mask;
pub mod matcher;
pub mod normalize;

use self::matcher::{BoundaryMatch, PrimerMatcher};
use self::mask::MaskOutcome;
use self::normalize::{GroupKey, NormalizationState, Normalizer};

/// 每批送入并行匹配/剪切阶段的记录数。
const BATCH: usize = 4096;

/// 流水线配置。
#[derive(Debug, Clone)]
pub struct TrimOpt {
    /// 引物边界匹配容差（碱基）
    pub match_tolerance: usize,
    /// 低于该比对质量的记录在匹配前丢弃
    pub min_mapping_quality: u8,
    /// 每个扩增子/方向组的最大深度；设置后进入缓冲模式
    pub max_amplicon_depth: Option<u32>,
    /// false 时只注释、不改写 CIGAR
    pub trim_primers: bool,
    /// 任一端不在容差内即丢弃（准入谓词，匹配算法不变）
    pub discard_unmatched: bool,
    /// 要求 read 完整覆盖扩增子插入区（准入谓词）
    pub require_full_length: bool,
    /// 输出头部写入引物池读组并给记录打 RG 标签
    pub read_groups: bool,
    pub threads: usize,
    /// 本次调用的完整命令行，写入输出头部的 @PG 记录
    pub invocation: String,
}

impl Default for TrimOpt {
    fn default() -> Self {
        Self {
            match_tolerance: 35,
            min_mapping_quality: 20,
            max_amplicon_depth: None,
            trim_primers: true,
            discard_unmatched: false,
            require_full_length: false,
            read_groups: true,
            threads: 1,
            invocation: String::new(),
        }
    }
}

/// 单条记录被丢弃的原因，写入报告的 status 列。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    MalformedInput,
    Unmapped,
    Supplementary,
    LowMappingQuality,
    NoPrimerMatch,
    FullyClipped,
    NormalizationExcess,
}

impl DiscardReason {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MalformedInput => "malformed_input",
            Self::Unmapped => "unmapped",
            Self::Supplementary => "supplementary",
            Self::LowMappingQuality => "low_mapping_quality",
            Self::NoPrimerMatch => "no_primer_match",
            Self::FullyClipped => "fully_clipped",
            Self::NormalizationExcess => "normalization_excess",
        }
    }
}

#[derive(Debug, Default)]
pub struct TrimStats {
    pub total: u64,
    pub emitted: u64,
    pub malformed: u64,
    pub unmapped: u64,
    pub supplementary: u64,
    pub low_mapping_quality: u64,
    pub no_primer_match: u64,
    pub fully_clipped: u64,
    pub normalization_excess: u64,
    /// 每个扩增子放行记录剪切后覆盖的参考碱基总数，供平均深度报告使用
    pub amplicon_bases: BTreeMap<String, u64>,
}

impl TrimStats {
    fn record_discard(&mut self, reason: DiscardReason) {
        match reason {
            DiscardReason::MalformedInput => self.malformed += 1,
            DiscardReason::Unmapped => self.unmapped += 1,
            DiscardReason::Supplementary => self.supplementary += 1,
            DiscardReason::LowMappingQuality => self.low_mapping_quality += 1,
            DiscardReason::NoPrimerMatch => self.no_primer_match += 1,
            DiscardReason::FullyClipped => self.fully_clipped += 1,
            DiscardReason::NormalizationExcess => self.normalization_excess += 1,
        }
    }

    pub fn discarded(&self) -> u64 {
        self.total - self.emitted
    }
}

/// 记录级裁决结果：匹配与剪切都在这一步完成（record 局部、无共享副作用，
/// 可安全并行），准入与写出留给驱动线程串行处理。
struct Assessment<'a> {
    record: RecordBuf,
    name: String,
    chrom: String,
    span: (usize, usize),
    left: Option<BoundaryMatch<'a>>,
    right: Option<BoundaryMatch<'a>>,
    amplicon: Option<String>,
    is_reverse: bool,
    left_masked: usize,
    right_masked: usize,
    trimmed_bases: u64,
    verdict: Option<DiscardReason>,
}

impl<'a> Assessment<'a> {
    fn report_row(&self, status: &'static str) -> ReportRow {
        ReportRow {
            name: self.name.clone(),
            chrom: self.chrom.clone(),
            start: self.span.0,
            end: self.span.1,
            left_primer: self.left.map(|m| m.primer.name.clone()),
            left_distance: self.left.map(|m| m.distance),
            right_primer: self.right.map(|m| m.primer.name.clone()),
            right_distance: self.right.map(|m| m.distance),
            left_masked: self.left_masked,
            right_masked: self.right_masked,
            amplicon: self.amplicon.clone(),
            correctly_paired: self.amplicon.is_some(),
            status,
        }
    }

    fn group_key(&self) -> Option<GroupKey> {
        self.amplicon.clone().map(|amplicon| (amplicon, self.is_reverse))
    }
}

fn discard<'a>(mut assessment: Assessment<'a>, reason: DiscardReason) -> Assessment<'a> {
    assessment.verdict = Some(reason);
    assessment
}

/// 对一条记录执行：标志/质量门控 → 匹配 → 准入谓词 → 软掩蔽 → RG 标签。
fn assess<'a>(
    record: RecordBuf,
    matcher: PrimerMatcher<'a>,
    chrom_names: &[String],
    opt: &TrimOpt,
) -> Assessment<'a> {
    let name = record
        .name()
        .map(|n| String::from_utf8_lossy(n.as_ref()).into_owned())
        .unwrap_or_else(|| "*".to_string());
    let flags = record.flags();
    let is_reverse = flags.is_reverse_complemented();

    let mut assessment = Assessment {
        record,
        name,
        chrom: "*".to_string(),
        span: (0, 0),
        left: None,
        right: None,
        amplicon: None,
        is_reverse,
        left_masked: 0,
        right_masked: 0,
        trimmed_bases: 0,
        verdict: None,
    };

    if flags.is_unmapped() {
        return discard(assessment, DiscardReason::Unmapped);
    }
    if flags.is_secondary() || flags.is_supplementary() {
        return discard(assessment, DiscardReason::Supplementary);
    }

    let Some(chrom) = assessment
        .record
        .reference_sequence_id()
        .and_then(|id| chrom_names.get(id))
        .cloned()
    else {
        return discard(assessment, DiscardReason::MalformedInput);
    };
    assessment.chrom = chrom;

    if let Some(mapq) = assessment.record.mapping_quality() {
        if u8::from(mapq) < opt.min_mapping_quality {
            return discard(assessment, DiscardReason::LowMappingQuality);
        }
    }

    if let Err(err) = mask::check_record(&assessment.record) {
        debug!("{}: {}", assessment.name, err);
        return discard(assessment, DiscardReason::MalformedInput);
    }
    let span = match mask::alignment_span(&assessment.record) {
        Ok(span) => span,
        Err(err) => {
            debug!("{}: {}", assessment.name, err);
            return discard(assessment, DiscardReason::MalformedInput);
        }
    };
    assessment.span = span;

    let result = matcher.match_read(&assessment.chrom, span.0, span.1);
    assessment.left = result.left;
    assessment.right = result.right;
    assessment.amplicon = result.amplicon().map(str::to_string);

    let left_within = result.left.is_some_and(|m| m.within);
    let right_within = result.right.is_some_and(|m| m.within);

    if opt.discard_unmatched && !(left_within && right_within) {
        return discard(assessment, DiscardReason::NoPrimerMatch);
    }
    if opt.require_full_length {
        let full_length = result.amplicon().is_some()
            && result.left.is_some_and(|m| span.0 <= m.primer.end)
            && result.right.is_some_and(|m| span.1 >= m.primer.start);
        if !full_length {
            return discard(assessment, DiscardReason::NoPrimerMatch);
        }
    }

    if opt.trim_primers {
        if let Some(m) = result.left.filter(|m| m.within) {
            match mask::softmask_start(&mut assessment.record, m.primer.end) {
                Ok(MaskOutcome::Masked { query_masked, .. }) => {
                    assessment.left_masked = query_masked;
                }
                Ok(MaskOutcome::FullyClipped) => {
                    return discard(assessment, DiscardReason::FullyClipped);
                }
                Err(err) => {
                    debug!("{}: {}", assessment.name, err);
                    return discard(assessment, DiscardReason::MalformedInput);
                }
            }
        }
        if let Some(m) = result.right.filter(|m| m.within) {
            match mask::softmask_end(&mut assessment.record, m.primer.start) {
                Ok(MaskOutcome::Masked { query_masked, .. }) => {
                    assessment.right_masked = query_masked;
                }
                Ok(MaskOutcome::FullyClipped) => {
                    return discard(assessment, DiscardReason::FullyClipped);
                }
                Err(err) => {
                    debug!("{}: {}", assessment.name, err);
                    return discard(assessment, DiscardReason::MalformedInput);
                }
            }
        }
    }

    if let Ok((start, end)) = mask::alignment_span(&assessment.record) {
        assessment.trimmed_bases = (end - start) as u64;
    }

    if opt.read_groups {
        let read_group = if result.correctly_paired() {
            result.left.map(|m| m.primer.pool.clone()).unwrap_or_default()
        } else {
            "unmatched".to_string()
        };
        assessment
            .record
            .data_mut()
            .insert(Tag::READ_GROUP, Value::from(read_group));
    }

    assessment
}

/// 放行后待写出的记录与其报告行。
struct Emission {
    record: RecordBuf,
    row: ReportRow,
    amplicon: Option<String>,
    bases: u64,
}

fn emit<W: AlignmentWrite>(
    writer: &mut W,
    header: &sam::Header,
    stats: &mut TrimStats,
    report: &mut Option<ReportWriter>,
    emission: Emission,
) -> Result<()> {
    writer
        .write_alignment_record(header, &emission.record)
        .context("failed to write alignment record")?;
    stats.emitted += 1;
    if let Some(amplicon) = &emission.amplicon {
        *stats.amplicon_bases.entry(amplicon.clone()).or_insert(0) += emission.bases;
    }
    if let Some(report) = report.as_mut() {
        report.write_row(&emission.row)?;
    }
    Ok(())
}

/// 核心循环：分批读取 → 并行匹配/剪切 → 串行准入与写出。
/// 输出顺序与输入一致（缓冲模式下按输入序号稳定恢复）。
pub fn process_records<'s, I, W>(
    scheme: &'s PrimerScheme,
    opt: &TrimOpt,
    header: &sam::Header,
    records: I,
    writer: &mut W,
    mut report: Option<ReportWriter>,
    state: &mut NormalizationState,
) -> Result<TrimStats>
where
    I: Iterator<Item = std::io::Result<RecordBuf>>,
    W: AlignmentWrite,
{
    let chrom_names: Vec<String> = header
        .reference_sequences()
        .keys()
        .map(|name| name.to_string())
        .collect();

    let matcher = PrimerMatcher::new(scheme, opt.match_tolerance);
    let mut normalizer: Normalizer<Emission> = Normalizer::new(opt.max_amplicon_depth);
    let mut stats = TrimStats::default();
    let mut ordinal: u64 = 0;

    let pool = if opt.threads > 1 {
        Some(
            rayon::ThreadPoolBuilder::new()
                .num_threads(opt.threads)
                .build()
                .context("failed to build worker thread pool")?,
        )
    } else {
        None
    };

    let mut records = records;
    loop {
        let mut batch: Vec<RecordBuf> = Vec::with_capacity(BATCH);
        for result in records.by_ref().take(BATCH) {
            batch.push(result.context("failed to read alignment record")?);
        }
        if batch.is_empty() {
            break;
        }

        let assessed: Vec<Assessment<'_>> = match &pool {
            Some(pool) => pool.install(|| {
                batch
                    .into_par_iter()
                    .map(|record| assess(record, matcher, &chrom_names, opt))
                    .collect()
            }),
            None => batch
                .into_iter()
                .map(|record| assess(record, matcher, &chrom_names, opt))
                .collect(),
        };

        for assessment in assessed {
            stats.total += 1;
            if let Some(reason) = assessment.verdict {
                debug!("{}: discarded ({})", assessment.name, reason.as_str());
                stats.record_discard(reason);
                if let Some(report) = report.as_mut() {
                    report.write_row(&assessment.report_row(reason.as_str()))?;
                }
            } else {
                let group = assessment.group_key();
                let emission = Emission {
                    row: assessment.report_row("emitted"),
                    amplicon: assessment.amplicon.clone(),
                    bases: assessment.trimmed_bases,
                    record: assessment.record,
                };
                if let Some(emission) = normalizer.offer(ordinal, group, emission, state) {
                    emit(writer, header, &mut stats, &mut report, emission)?;
                }
            }
            ordinal += 1;
        }
    }

    // buffered mode releases here, in input order
    for resolved in normalizer.finish(state) {
        let emission = resolved.pending.payload;
        if resolved.kept {
            emit(writer, header, &mut stats, &mut report, emission)?;
        } else {
            stats.record_discard(DiscardReason::NormalizationExcess);
            if let Some(report) = report.as_mut() {
                let mut row = emission.row;
                row.status = DiscardReason::NormalizationExcess.as_str();
                report.write_row(&row)?;
            }
        }
    }

    if let Some(report) = report.take() {
        report.finish()?;
    }

    Ok(stats)
}

/// 在输出头部追加本次运行的 @PG 记录（只追加，不覆盖已有历史）。
fn append_program(header: &mut sam::Header, invocation: &str) -> Result<()> {
    let mut builder = Map::<Program>::builder()
        .insert(program_tag::NAME, env!("CARGO_PKG_NAME"))
        .insert(program_tag::VERSION, env!("CARGO_PKG_VERSION"));
    if !invocation.is_empty() {
        builder = builder.insert(program_tag::COMMAND_LINE, invocation);
    }
    let program = builder.build().context("failed to build @PG record")?;
    header
        .programs_mut()
        .add(env!("CARGO_PKG_NAME"), program)
        .context("failed to append @PG record")?;
    Ok(())
}

/// 每个引物池一个读组，外加 unmatched。
fn add_read_groups(header: &mut sam::Header, scheme: &PrimerScheme) {
    for pool in scheme.pools() {
        header
            .read_groups_mut()
            .insert(pool.as_bytes().to_vec().into(), Map::<ReadGroup>::default());
    }
    header
        .read_groups_mut()
        .insert(b"unmatched".to_vec().into(), Map::<ReadGroup>::default());
}

/// 驱动入口：读取 BAM、改写头部、运行流水线并收尾。
pub fn trim_alignments<R, W>(
    scheme: &PrimerScheme,
    opt: &TrimOpt,
    reader: &mut bam::io::Reader<R>,
    writer: &mut W,
    report: Option<ReportWriter>,
    state: &mut NormalizationState,
) -> Result<TrimStats>
where
    R: std::io::Read,
    W: AlignmentWrite,
{
    let header = reader.read_header().context("failed to read BAM header")?;

    let mut out_header = header.clone();
    append_program(&mut out_header, &opt.invocation)?;
    if opt.read_groups {
        add_read_groups(&mut out_header, scheme);
    }
    writer
        .write_alignment_header(&out_header)
        .context("failed to write output header")?;

    let stats = process_records(
        scheme,
        opt,
        &out_header,
        reader.record_bufs(&header),
        writer,
        report,
        state,
    )?;

    writer.finish(&out_header).context("failed to finish output stream")?;

    info!(
        "processed {} records: {} emitted, {} discarded ({} unmapped, {} supplementary, \
         {} low mapq, {} malformed, {} unmatched, {} fully clipped, {} over depth)",
        stats.total,
        stats.emitted,
        stats.discarded(),
        stats.unmapped,
        stats.supplementary,
        stats.low_mapping_quality,
        stats.malformed,
        stats.no_primer_match,
        stats.fully_clipped,
        stats.normalization_excess,
    );

    Ok(stats)
}


#[cfg(test)]
mod tests {
    use super::testutil::mapped_record;
    use super::*;
    use crate::io::bed::BedRecord;
    use noodles::sam::alignment::record::Flags;
    use noodles::sam::header::record::value::map::ReferenceSequence;
    use std::num::NonZeroUsize;

    fn bed(chrom: &str, start: usize, end: usize, name: &str, pool: &str, strand: char) -> BedRecord {
        BedRecord {
            chrom: chrom.to_string(),
            start,
            end,
            name: name.to_string(),
            pool: pool.to_string(),
            strand: Some(strand),
        }
    }

    fn scheme() -> PrimerScheme {
        PrimerScheme::load(&[
            bed("chrX", 100, 120, "scheme_1_LEFT", "1", '+'),
            bed("chrX", 380, 400, "scheme_1_RIGHT", "1", '-'),
            bed("chrX", 350, 370, "scheme_2_LEFT", "2", '+'),
            bed("chrX", 630, 650, "scheme_2_RIGHT", "2", '-'),
        ])
        .unwrap()
    }

    fn test_header() -> sam::Header {
        let mut header = sam::Header::default();
        header.reference_sequences_mut().insert(
            b"chrX".to_vec().into(),
            Map::<ReferenceSequence>::new(NonZeroUsize::new(10_000).expect("length")),
        );
        header
    }

    fn run(
        scheme: &PrimerScheme,
        opt: &TrimOpt,
        records: Vec<RecordBuf>,
    ) -> (TrimStats, Vec<String>) {
        let header = test_header();
        let mut writer = sam::io::Writer::new(Vec::new());
        let mut state = NormalizationState::new();
        let stats = process_records(
            scheme,
            opt,
            &header,
            records.into_iter().map(Ok),
            &mut writer,
            None,
            &mut state,
        )
        .unwrap();
        let text = String::from_utf8(writer.into_inner()).unwrap();
        (stats, text.lines().map(str::to_string).collect())
    }

    fn sam_field(line: &str, index: usize) -> String {
        line.split('\t').nth(index).unwrap().to_string()
    }

    #[test]
    fn exact_amplicon_read_is_trimmed_to_insert() {
        let (stats, lines) = run(
            &scheme(),
            &TrimOpt::default(),
            vec![mapped_record(101, "300M", 300)],
        );
        assert_eq!(stats.total, 1);
        assert_eq!(stats.emitted, 1);
        assert_eq!(lines.len(), 1);

        // POS is column 4, CIGAR column 6 (1-based) in SAM
        assert_eq!(sam_field(&lines[0], 3), "121");
        assert_eq!(sam_field(&lines[0], 5), "20S260M20S");
        assert!(lines[0].contains("RG:Z:1"));
    }

    #[test]
    fn distant_read_passes_through_untrimmed() {
        // [50,90): no primer within tolerance of either boundary
        let (stats, lines) = run(
            &scheme(),
            &TrimOpt::default(),
            vec![mapped_record(51, "40M", 40)],
        );
        assert_eq!(stats.emitted, 1);
        assert_eq!(stats.discarded(), 0);
        assert_eq!(sam_field(&lines[0], 3), "51");
        assert_eq!(sam_field(&lines[0], 5), "40M");
        assert!(lines[0].contains("RG:Z:unmatched"));
    }

    #[test]
    fn unmapped_and_supplementary_are_discarded() {
        let mut unmapped = mapped_record(101, "300M", 300);
        *unmapped.flags_mut() = Flags::UNMAPPED;
        let mut supplementary = mapped_record(101, "300M", 300);
        *supplementary.flags_mut() = Flags::SUPPLEMENTARY;

        let (stats, lines) = run(&scheme(), &TrimOpt::default(), vec![unmapped, supplementary]);
        assert_eq!(stats.emitted, 0);
        assert_eq!(stats.unmapped, 1);
        assert_eq!(stats.supplementary, 1);
        assert!(lines.is_empty());
    }

    #[test]
    fn low_mapping_quality_is_discarded_before_matching() {
        use noodles::sam::alignment::record::MappingQuality;
        let mut record = mapped_record(101, "300M", 300);
        *record.mapping_quality_mut() = MappingQuality::new(5);

        let (stats, _) = run(&scheme(), &TrimOpt::default(), vec![record]);
        assert_eq!(stats.low_mapping_quality, 1);
        assert_eq!(stats.emitted, 0);
    }

    #[test]
    fn cigar_sequence_mismatch_is_malformed() {
        let (stats, _) = run(&scheme(), &TrimOpt::default(), vec![mapped_record(101, "300M", 40)]);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.emitted, 0);
    }

    #[test]
    fn read_inside_primer_is_fully_clipped() {
        // [100,118) sits entirely inside the forward primer span
        let (stats, lines) = run(&scheme(), &TrimOpt::default(), vec![mapped_record(101, "18M", 18)]);
        assert_eq!(stats.fully_clipped, 1);
        assert_eq!(stats.emitted, 0);
        assert!(lines.is_empty());
    }

    #[test]
    fn no_trim_primers_keeps_alignment_intact() {
        let opt = TrimOpt { trim_primers: false, ..TrimOpt::default() };
        let (stats, lines) = run(&scheme(), &opt, vec![mapped_record(101, "300M", 300)]);
        assert_eq!(stats.emitted, 1);
        assert_eq!(sam_field(&lines[0], 3), "101");
        assert_eq!(sam_field(&lines[0], 5), "300M");
    }

    #[test]
    fn discard_unmatched_predicate() {
        let opt = TrimOpt { discard_unmatched: true, ..TrimOpt::default() };
        let (stats, lines) = run(
            &scheme(),
            &opt,
            vec![mapped_record(51, "40M", 40), mapped_record(101, "300M", 300)],
        );
        assert_eq!(stats.no_primer_match, 1);
        assert_eq!(stats.emitted, 1);
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn require_full_length_predicate() {
        let opt = TrimOpt { require_full_length: true, ..TrimOpt::default() };
        // covers the whole insert
        let full = mapped_record(101, "300M", 300);
        // starts inside the insert
        let partial = mapped_record(201, "150M", 150);

        let (stats, _) = run(&scheme(), &opt, vec![full, partial]);
        assert_eq!(stats.emitted, 1);
        assert_eq!(stats.no_primer_match, 1);
    }

    #[test]
    fn depth_cap_keeps_first_records_per_group() {
        let opt = TrimOpt { max_amplicon_depth: Some(2), ..TrimOpt::default() };
        let records: Vec<RecordBuf> = (0..5).map(|_| mapped_record(101, "300M", 300)).collect();

        let (stats, lines) = run(&scheme(), &opt, records);
        assert_eq!(stats.total, 5);
        assert_eq!(stats.emitted, 2);
        assert_eq!(stats.normalization_excess, 3);
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn depth_cap_selection_is_deterministic() {
        let build = || (0..5).map(|_| mapped_record(101, "300M", 300)).collect::<Vec<_>>();
        let opt = TrimOpt { max_amplicon_depth: Some(2), ..TrimOpt::default() };

        let (_, first) = run(&scheme(), &opt, build());
        let (_, second) = run(&scheme(), &opt, build());
        assert_eq!(first, second);
    }

    #[test]
    fn streaming_output_count_matches_input_minus_discards() {
        let mut unmapped = mapped_record(101, "300M", 300);
        *unmapped.flags_mut() = Flags::UNMAPPED;
        let records = vec![
            mapped_record(101, "300M", 300),
            unmapped,
            mapped_record(351, "290M", 290),
        ];

        let (stats, lines) = run(&scheme(), &TrimOpt::default(), records);
        assert_eq!(stats.total, 3);
        assert_eq!(stats.emitted, 2);
        assert_eq!(lines.len() as u64, stats.total - 1);
    }

    #[test]
    fn depth_report_accumulates_trimmed_bases() {
        let (stats, _) = run(
            &scheme(),
            &TrimOpt::default(),
            vec![mapped_record(101, "300M", 300), mapped_record(101, "300M", 300)],
        );
        // each read covers the [120,380) insert after trimming
        assert_eq!(stats.amplicon_bases.get("scheme_1"), Some(&520));
    }

    #[test]
    fn orientation_groups_are_capped_separately() {
        let opt = TrimOpt { max_amplicon_depth: Some(1), ..TrimOpt::default() };
        let forward = mapped_record(101, "300M", 300);
        let mut reverse = mapped_record(101, "300M", 300);
        *reverse.flags_mut() = Flags::REVERSE_COMPLEMENTED;

        let (stats, _) = run(&scheme(), &opt, vec![forward, reverse]);
        assert_eq!(stats.emitted, 2);
        assert_eq!(stats.normalization_excess, 0);
    }

    #[test]
    fn parallel_and_serial_runs_agree() {
        let build = || {
            (0..40)
                .map(|i| mapped_record(101 + (i % 3), "300M", 300))
                .collect::<Vec<_>>()
        };
        let serial_opt = TrimOpt::default();
        let parallel_opt = TrimOpt { threads: 4, ..TrimOpt::default() };

        let (serial_stats, serial_lines) = run(&scheme(), &serial_opt, build());
        let (parallel_stats, parallel_lines) = run(&scheme(), &parallel_opt, build());
        assert_eq!(serial_stats.emitted, parallel_stats.emitted);
        assert_eq!(serial_lines, parallel_lines);
    }

    #[test]
    fn header_gains_program_and_read_groups() {
        let mut header = test_header();
        append_program(&mut header, "ampliclip -b primer.bed in.bam").unwrap();
        add_read_groups(&mut header, &scheme());

        assert_eq!(header.programs().as_ref().len(), 1);
        assert_eq!(header.read_groups().len(), 3); // pools 1, 2 + unmatched
    }
}
