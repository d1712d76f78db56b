use noodles::core::Position;
use noodles::sam::alignment::record::cigar::op::Kind;
use noodles::sam::alignment::record::cigar::Cigar as _;
use noodles::sam::alignment::record::cigar::Op;
use noodles::sam::alignment::record_buf::{Cigar as CigarBuf, RecordBuf};
use thiserror::Error;

/// 单条记录不合法时的可恢复错误：记录按 `malformed_input` 丢弃，处理继续。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("mapped record has an empty CIGAR")]
    EmptyCigar,

    #[error("record has no alignment start")]
    MissingPosition,

    #[error("CIGAR consumes {cigar} query bases but the sequence stores {sequence}")]
    QueryLengthMismatch { cigar: usize, sequence: usize },
}

/// 软掩蔽结果。`FullyClipped` 表示整条 read 的比对区间都会被剪掉，
/// 记录保持原样由调用方丢弃，绝不输出残缺记录。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskOutcome {
    Masked { ref_removed: usize, query_masked: usize },
    FullyClipped,
}

#[inline]
fn consumes_read(kind: Kind) -> bool {
    matches!(
        kind,
        Kind::Match | Kind::SequenceMatch | Kind::SequenceMismatch | Kind::Insertion
    )
}

#[inline]
fn consumes_ref(kind: Kind) -> bool {
    matches!(
        kind,
        Kind::Match | Kind::SequenceMatch | Kind::SequenceMismatch | Kind::Deletion | Kind::Skip
    )
}

#[inline]
fn is_aligned(kind: Kind) -> bool {
    matches!(kind, Kind::Match | Kind::SequenceMatch | Kind::SequenceMismatch)
}

fn collect_ops(record: &RecordBuf) -> Vec<Op> {
    record.cigar().iter().filter_map(Result::ok).collect()
}

/// 操作列表覆盖的参考碱基数。
pub fn reference_len(ops: &[Op]) -> usize {
    ops.iter().filter(|op| consumes_ref(op.kind())).map(|op| op.len()).sum()
}

/// 操作列表消耗的 query 碱基数（含软剪切）。
pub fn query_len(ops: &[Op]) -> usize {
    ops.iter()
        .filter(|op| consumes_read(op.kind()) || op.kind() == Kind::SoftClip)
        .map(|op| op.len())
        .sum()
}

/// 记录的比对区间 [start, end)，0-based 半开。
pub fn alignment_span(record: &RecordBuf) -> Result<(usize, usize), RecordError> {
    let start = record.alignment_start().ok_or(RecordError::MissingPosition)?;
    let ops = collect_ops(record);
    if ops.is_empty() {
        return Err(RecordError::EmptyCigar);
    }
    let start0 = usize::from(start) - 1;
    Ok((start0, start0 + reference_len(&ops)))
}

/// 校验 CIGAR 与存储序列的长度一致（无序列的记录跳过校验）。
pub fn check_record(record: &RecordBuf) -> Result<(), RecordError> {
    let ops = collect_ops(record);
    if ops.is_empty() {
        return Err(RecordError::EmptyCigar);
    }
    let sequence = record.sequence().len();
    if sequence > 0 {
        let cigar = query_len(&ops);
        if cigar != sequence {
            return Err(RecordError::QueryLengthMismatch { cigar, sequence });
        }
    }
    Ok(())
}

/// 将比对起点推进到参考坐标 `target`（0-based）之后：target 之前由本记录
/// 比对消耗的 query 碱基全部转为软剪切。
///
/// 保证：query 总长不变；新起点只前移且恰好等于被移除的参考碱基数；
/// 剪切边界上的插入并入软剪切；新起点处不残留 D/N；不产生零长操作；
/// 已有软剪切并入新剪切，硬剪切保持最外层。
pub fn softmask_start(record: &mut RecordBuf, target: usize) -> Result<MaskOutcome, RecordError> {
    let start = record.alignment_start().ok_or(RecordError::MissingPosition)?;
    let ops = collect_ops(record);
    if ops.is_empty() {
        return Err(RecordError::EmptyCigar);
    }

    let start0 = usize::from(start) - 1;
    if target <= start0 {
        return Ok(MaskOutcome::Masked { ref_removed: 0, query_masked: 0 });
    }

    let leading_hard: usize = ops
        .iter()
        .take_while(|op| op.kind() == Kind::HardClip)
        .map(|op| op.len())
        .sum();
    let leading_soft: usize = ops
        .iter()
        .skip_while(|op| op.kind() == Kind::HardClip)
        .take_while(|op| op.kind() == Kind::SoftClip)
        .map(|op| op.len())
        .sum();

    let body: Vec<Op> = ops
        .iter()
        .copied()
        .skip_while(|op| matches!(op.kind(), Kind::HardClip | Kind::SoftClip))
        .collect();

    let mut ref_pos = start0;
    let mut masked = 0usize;
    let mut rest: Vec<Op> = Vec::new();
    let mut iter = body.into_iter().peekable();

    while ref_pos < target {
        let Some(op) = iter.next() else { break };
        let kind = op.kind();
        let len = op.len();

        if is_aligned(kind) {
            if ref_pos + len > target {
                // straddles the clip point: split
                let cut = target - ref_pos;
                masked += cut;
                ref_pos = target;
                rest.push(Op::new(kind, len - cut));
            } else {
                masked += len;
                ref_pos += len;
            }
        } else if consumes_ref(kind) {
            // deletion/skip: removed whole even when it straddles the target,
            // the new start may only move further right
            ref_pos += len;
        } else if consumes_read(kind) {
            // insertion at or before the boundary folds into the clip
            masked += len;
        } else if matches!(kind, Kind::SoftClip | Kind::HardClip) {
            // ran into the trailing clips: nothing aligned remains
            rest.push(op);
            break;
        }
        // Pad consumes nothing and is dropped
    }

    // no D/N directly after the new start
    while rest.is_empty() {
        match iter.peek() {
            Some(op) if matches!(op.kind(), Kind::Deletion | Kind::Skip) => {
                ref_pos += op.len();
                iter.next();
            }
            _ => break,
        }
    }
    rest.extend(iter);

    if !rest.iter().any(|op| is_aligned(op.kind())) {
        return Ok(MaskOutcome::FullyClipped);
    }

    let total_soft = leading_soft + masked;
    let mut final_ops: Vec<Op> = Vec::with_capacity(rest.len() + 2);
    if leading_hard > 0 {
        final_ops.push(Op::new(Kind::HardClip, leading_hard));
    }
    if total_soft > 0 {
        final_ops.push(Op::new(Kind::SoftClip, total_soft));
    }
    final_ops.extend(rest.into_iter().filter(|op| op.len() > 0));

    *record.cigar_mut() = CigarBuf::from(final_ops);

    let ref_removed = ref_pos - start0;
    if ref_removed > 0 {
        if let Some(new_start) = Position::new(ref_pos + 1) {
            *record.alignment_start_mut() = Some(new_start);
        }
    }

    Ok(MaskOutcome::Masked { ref_removed, query_masked: masked })
}

/// `softmask_start` 的对称操作：把比对终点收回到参考坐标 `target`（0-based，
/// 新的半开终点 ≤ target）。起点坐标不变。
pub fn softmask_end(record: &mut RecordBuf, target: usize) -> Result<MaskOutcome, RecordError> {
    let start = record.alignment_start().ok_or(RecordError::MissingPosition)?;
    let ops = collect_ops(record);
    if ops.is_empty() {
        return Err(RecordError::EmptyCigar);
    }

    let start0 = usize::from(start) - 1;
    let end0 = start0 + reference_len(&ops);
    if target >= end0 {
        return Ok(MaskOutcome::Masked { ref_removed: 0, query_masked: 0 });
    }

    let trailing_hard: usize = ops
        .iter()
        .rev()
        .take_while(|op| op.kind() == Kind::HardClip)
        .map(|op| op.len())
        .sum();
    let trailing_soft: usize = ops
        .iter()
        .rev()
        .skip_while(|op| op.kind() == Kind::HardClip)
        .take_while(|op| op.kind() == Kind::SoftClip)
        .map(|op| op.len())
        .sum();

    let mut body: Vec<Op> = ops
        .into_iter()
        .rev()
        .skip_while(|op| matches!(op.kind(), Kind::HardClip | Kind::SoftClip))
        .collect();
    body.reverse();

    let mut ref_pos = end0;
    let mut masked = 0usize;
    let mut rest_rev: Vec<Op> = Vec::new();
    let mut iter = body.into_iter().rev().peekable();

    while ref_pos > target {
        let Some(op) = iter.next() else { break };
        let kind = op.kind();
        let len = op.len();

        if is_aligned(kind) {
            if ref_pos.saturating_sub(len) < target {
                let cut = ref_pos - target;
                masked += cut;
                ref_pos = target;
                rest_rev.push(Op::new(kind, len - cut));
            } else {
                masked += len;
                ref_pos -= len;
            }
        } else if consumes_ref(kind) {
            ref_pos -= len;
        } else if consumes_read(kind) {
            masked += len;
        } else if matches!(kind, Kind::SoftClip | Kind::HardClip) {
            rest_rev.push(op);
            break;
        }
    }

    // no D/N directly before the new end
    while rest_rev.is_empty() {
        match iter.peek() {
            Some(op) if matches!(op.kind(), Kind::Deletion | Kind::Skip) => {
                ref_pos -= op.len();
                iter.next();
            }
            _ => break,
        }
    }
    rest_rev.extend(iter);

    if !rest_rev.iter().any(|op| is_aligned(op.kind())) {
        return Ok(MaskOutcome::FullyClipped);
    }

    let total_soft = trailing_soft + masked;
    let mut final_ops: Vec<Op> = Vec::with_capacity(rest_rev.len() + 2);
    final_ops.extend(rest_rev.into_iter().rev().filter(|op| op.len() > 0));
    if total_soft > 0 {
        final_ops.push(Op::new(Kind::SoftClip, total_soft));
    }
    if trailing_hard > 0 {
        final_ops.push(Op::new(Kind::HardClip, trailing_hard));
    }

    *record.cigar_mut() = CigarBuf::from(final_ops);

    Ok(MaskOutcome::Masked { ref_removed: end0 - ref_pos, query_masked: masked })
}
