use crate::scheme::{Primer, PrimerDirection, PrimerScheme};

/// 单侧边界的匹配结果。distance 为带符号偏移：
/// 5′ 端为 read_start - primer.start，3′ 端为 read_end - primer.end。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundaryMatch<'a> {
    pub primer: &'a Primer,
    pub distance: i64,
    pub within: bool,
}

/// 一条 read 两端的匹配结果，逐条生成、用完即弃。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MatchResult<'a> {
    pub left: Option<BoundaryMatch<'a>>,
    pub right: Option<BoundaryMatch<'a>>,
}

impl<'a> MatchResult<'a> {
    /// 两端都在容差内且属于同一扩增子。
    pub fn correctly_paired(&self) -> bool {
        self.amplicon().is_some()
    }

    /// 配对成功时返回扩增子编号。
    pub fn amplicon(&self) -> Option<&'a str> {
        match (&self.left, &self.right) {
            (Some(l), Some(r))
                if l.within && r.within && l.primer.amplicon == r.primer.amplicon =>
            {
                Some(l.primer.amplicon.as_str())
            }
            _ => None,
        }
    }
}

/// 纯查询、无副作用的引物匹配器，内部只借用只读 scheme。
#[derive(Debug, Clone, Copy)]
pub struct PrimerMatcher<'a> {
    scheme: &'a PrimerScheme,
    tolerance: usize,
}

impl<'a> PrimerMatcher<'a> {
    pub fn new(scheme: &'a PrimerScheme, tolerance: usize) -> Self {
        Self { scheme, tolerance }
    }

    /// 对 read 的两个参考边界（0-based 半开）做最近引物查询。
    ///
    /// 5′ 端先解析（并列取名字最小者），3′ 端在并列时优先选择与 5′ 端
    /// 引物池一致的候选，保持扩增子配对的内部一致；仍并列时取名字最小者。
    /// 全程确定性：相同输入必然产生相同结果。
    pub fn match_read(&self, chrom: &str, read_start: usize, read_end: usize) -> MatchResult<'a> {
        let left = self.pick(
            self.scheme.primers_near(chrom, read_start, PrimerDirection::Forward),
            read_start,
            None,
        );
        let left_pool = left.map(|m| m.primer.pool.as_str());
        let right = self.pick(
            self.scheme.primers_near(chrom, read_end, PrimerDirection::Reverse),
            read_end,
            left_pool,
        );
        MatchResult { left, right }
    }

    /// 候选集已按距离并列、名字升序；引物池偏好只在并列集中挑选。
    fn pick(
        &self,
        candidates: Vec<&'a Primer>,
        pos: usize,
        prefer_pool: Option<&str>,
    ) -> Option<BoundaryMatch<'a>> {
        if candidates.is_empty() {
            return None;
        }

        let primer = prefer_pool
            .and_then(|pool| candidates.iter().find(|p| p.pool == pool).copied())
            .unwrap_or(candidates[0]);

        let distance = pos as i64 - primer.boundary() as i64;
        Some(BoundaryMatch {
            primer,
            distance,
            within: distance.unsigned_abs() as usize <= self.tolerance,
        })
    }
}
