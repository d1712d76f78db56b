use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

use crate::io::bed::BedRecord;

/// 引物 scheme 自身不一致时的致命错误，在处理任何比对记录之前触发。
#[derive(Debug, Error)]
pub enum SchemeError {
    #[error("primer '{name}': invalid coordinates [{start}, {end})")]
    InvalidCoordinates { name: String, start: usize, end: usize },

    #[error("primer '{name}': cannot determine direction (no strand column and no _LEFT/_RIGHT suffix)")]
    UnknownDirection { name: String },

    #[error("primers '{first}' and '{second}' share span [{start}, {end}) on {chrom} in pool '{pool}'")]
    DuplicatePrimer {
        first: String,
        second: String,
        chrom: String,
        start: usize,
        end: usize,
        pool: String,
    },

    #[error("amplicon '{amplicon}': missing its {missing} primer")]
    UnpairedPrimer { amplicon: String, missing: &'static str },

    #[error("amplicon '{amplicon}': primers belong to different pools ('{left}' vs '{right}')")]
    MixedPools { amplicon: String, left: String, right: String },

    #[error("amplicon '{amplicon}': primers map to different references ('{left}' vs '{right}')")]
    SplitReferences { amplicon: String, left: String, right: String },

    #[error("amplicon '{amplicon}': forward primer does not precede reverse primer")]
    InvertedAmplicon { amplicon: String },

    #[error("primer scheme contains no primers")]
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimerDirection {
    Forward,
    Reverse,
}

/// 单条（合并后的）引物。坐标为 0-based 半开区间，加载后不可变。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Primer {
    pub name: String,
    pub chrom: String,
    pub start: usize,
    pub end: usize,
    pub direction: PrimerDirection,
    pub pool: String,
    /// 由引物名推导的扩增子编号（`nCoV-2019_12_LEFT` → `nCoV-2019_12`）
    pub amplicon: String,
}

impl Primer {
    /// 匹配查询使用的边界坐标：正向引物取 start（read 起点对齐处），
    /// 反向引物取 end（read 终点对齐处）。
    #[inline]
    pub fn boundary(&self) -> usize {
        match self.direction {
            PrimerDirection::Forward => self.start,
            PrimerDirection::Reverse => self.end,
        }
    }
}

/// 一对正/反向引物围成的扩增子，left/right 为 `PrimerScheme::primers` 下标。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Amplicon {
    pub name: String,
    pub chrom: String,
    pub pool: String,
    pub left: usize,
    pub right: usize,
}

/// 每条参考序列上的查询索引：正向引物按 start、反向引物按 end 排序，
/// 用二分查找替代线性扫描。
#[derive(Debug, Default)]
struct ChromIndex {
    forward: Vec<usize>,
    reverse: Vec<usize>,
}

/// 引物 scheme：启动时构建一次，之后只读（可跨线程共享）。
#[derive(Debug)]
pub struct PrimerScheme {
    primers: Vec<Primer>,
    amplicons: BTreeMap<String, Amplicon>,
    by_chrom: HashMap<String, ChromIndex>,
}

/// 从引物名中拆出扩增子编号与方向后缀。
/// `_alt`/数字后缀的备选引物（spike-in）归并到同一方向。
fn parse_primer_name(name: &str) -> (String, Option<PrimerDirection>) {
    let tokens: Vec<&str> = name.split('_').collect();
    for (i, token) in tokens.iter().enumerate() {
        let direction = match token.to_ascii_uppercase().as_str() {
            "LEFT" => Some(PrimerDirection::Forward),
            "RIGHT" => Some(PrimerDirection::Reverse),
            _ => None,
        };
        if direction.is_some() {
            return (tokens[..i].join("_"), direction);
        }
    }
    (name.to_string(), None)
}

impl PrimerScheme {
    /// 从 BED 记录构建 scheme。合并备选引物、配对扩增子并校验坐标与配对不变量；
    /// 任何不一致都会在处理比对记录之前失败。
    pub fn load(records: &[BedRecord]) -> Result<Self, SchemeError> {
        if records.is_empty() {
            return Err(SchemeError::Empty);
        }

        // merge alternates: one span per (chrom, amplicon, direction)
        #[derive(Debug)]
        struct Merged {
            start: usize,
            end: usize,
            pool: String,
            chrom: String,
            amplicon: String,
            direction: PrimerDirection,
        }

        let mut merged: BTreeMap<(String, String, bool), Merged> = BTreeMap::new();

        for rec in records {
            if rec.start >= rec.end {
                return Err(SchemeError::InvalidCoordinates {
                    name: rec.name.clone(),
                    start: rec.start,
                    end: rec.end,
                });
            }

            let (amplicon, name_direction) = parse_primer_name(&rec.name);
            let direction = match rec.strand {
                Some('+') => PrimerDirection::Forward,
                Some('-') => PrimerDirection::Reverse,
                _ => name_direction.ok_or_else(|| SchemeError::UnknownDirection {
                    name: rec.name.clone(),
                })?,
            };

            let key = (
                rec.chrom.clone(),
                amplicon.clone(),
                direction == PrimerDirection::Reverse,
            );
            match merged.get_mut(&key) {
                Some(m) => {
                    if m.pool != rec.pool {
                        return Err(SchemeError::MixedPools {
                            amplicon,
                            left: m.pool.clone(),
                            right: rec.pool.clone(),
                        });
                    }
                    m.start = m.start.min(rec.start);
                    m.end = m.end.max(rec.end);
                }
                None => {
                    merged.insert(
                        key,
                        Merged {
                            start: rec.start,
                            end: rec.end,
                            pool: rec.pool.clone(),
                            chrom: rec.chrom.clone(),
                            amplicon,
                            direction,
                        },
                    );
                }
            }
        }

        let mut primers: Vec<Primer> = merged
            .into_values()
            .map(|m| {
                let suffix = match m.direction {
                    PrimerDirection::Forward => "LEFT",
                    PrimerDirection::Reverse => "RIGHT",
                };
                Primer {
                    name: format!("{}_{}", m.amplicon, suffix),
                    chrom: m.chrom,
                    start: m.start,
                    end: m.end,
                    direction: m.direction,
                    pool: m.pool,
                    amplicon: m.amplicon,
                }
            })
            .collect();
        primers.sort_by(|a, b| {
            (&a.chrom, a.start, a.end, &a.name).cmp(&(&b.chrom, b.start, b.end, &b.name))
        });

        // identical spans in one pool from different amplicons are unresolvable
        for window in primers.windows(2) {
            let (a, b) = (&window[0], &window[1]);
            if a.chrom == b.chrom
                && a.pool == b.pool
                && a.direction == b.direction
                && a.start == b.start
                && a.end == b.end
                && a.amplicon != b.amplicon
            {
                return Err(SchemeError::DuplicatePrimer {
                    first: a.name.clone(),
                    second: b.name.clone(),
                    chrom: a.chrom.clone(),
                    start: a.start,
                    end: a.end,
                    pool: a.pool.clone(),
                });
            }
        }

        // pair primers into amplicons
        let mut halves: BTreeMap<String, (Option<usize>, Option<usize>)> = BTreeMap::new();
        for (i, primer) in primers.iter().enumerate() {
            let entry = halves.entry(primer.amplicon.clone()).or_insert((None, None));
            match primer.direction {
                PrimerDirection::Forward => entry.0 = Some(i),
                PrimerDirection::Reverse => entry.1 = Some(i),
            }
        }

        let mut amplicons = BTreeMap::new();
        for (name, (left, right)) in halves {
            let left = left.ok_or_else(|| SchemeError::UnpairedPrimer {
                amplicon: name.clone(),
                missing: "forward",
            })?;
            let right = right.ok_or_else(|| SchemeError::UnpairedPrimer {
                amplicon: name.clone(),
                missing: "reverse",
            })?;

            let (fwd, rev) = (&primers[left], &primers[right]);
            if fwd.chrom != rev.chrom {
                return Err(SchemeError::SplitReferences {
                    amplicon: name,
                    left: fwd.chrom.clone(),
                    right: rev.chrom.clone(),
                });
            }
            if fwd.pool != rev.pool {
                return Err(SchemeError::MixedPools {
                    amplicon: name,
                    left: fwd.pool.clone(),
                    right: rev.pool.clone(),
                });
            }
            if fwd.start >= rev.end {
                return Err(SchemeError::InvertedAmplicon { amplicon: name });
            }

            amplicons.insert(
                name.clone(),
                Amplicon {
                    name,
                    chrom: fwd.chrom.clone(),
                    pool: fwd.pool.clone(),
                    left,
                    right,
                },
            );
        }

        // per-reference sorted query keys
        let mut by_chrom: HashMap<String, ChromIndex> = HashMap::new();
        for (i, primer) in primers.iter().enumerate() {
            let index = by_chrom.entry(primer.chrom.clone()).or_default();
            match primer.direction {
                PrimerDirection::Forward => index.forward.push(i),
                PrimerDirection::Reverse => index.reverse.push(i),
            }
        }
        for index in by_chrom.values_mut() {
            index
                .forward
                .sort_by(|&a, &b| (primers[a].start, &primers[a].name).cmp(&(primers[b].start, &primers[b].name)));
            index
                .reverse
                .sort_by(|&a, &b| (primers[a].end, &primers[a].name).cmp(&(primers[b].end, &primers[b].name)));
        }

        Ok(Self { primers, amplicons, by_chrom })
    }

    /// 返回 pos 处按方向查询的最近引物集合（并列距离全部返回，按名字排序）。
    /// 排序键数组上二分定位，再向两侧收集并列者：O(log P + t)。
    pub fn primers_near(
        &self,
        chrom: &str,
        pos: usize,
        direction: PrimerDirection,
    ) -> Vec<&Primer> {
        let Some(index) = self.by_chrom.get(chrom) else {
            return Vec::new();
        };
        let list = match direction {
            PrimerDirection::Forward => &index.forward,
            PrimerDirection::Reverse => &index.reverse,
        };
        if list.is_empty() {
            return Vec::new();
        }

        let key = |i: usize| self.primers[list[i]].boundary();
        let split = list.partition_point(|&p| self.primers[p].boundary() < pos);

        let mut best = usize::MAX;
        if split > 0 {
            best = best.min(pos - key(split - 1));
        }
        if split < list.len() {
            best = best.min(key(split) - pos);
        }

        let mut ties: Vec<&Primer> = Vec::new();
        let mut i = split;
        while i > 0 && pos - key(i - 1) == best {
            ties.push(&self.primers[list[i - 1]]);
            i -= 1;
        }
        let mut j = split;
        while j < list.len() && key(j) - pos == best {
            ties.push(&self.primers[list[j]]);
            j += 1;
        }

        ties.sort_by(|a, b| a.name.cmp(&b.name));
        ties
    }

    pub fn primers(&self) -> &[Primer] {
        &self.primers
    }

    pub fn amplicon(&self, name: &str) -> Option<&Amplicon> {
        self.amplicons.get(name)
    }

    pub fn amplicons(&self) -> impl Iterator<Item = &Amplicon> {
        self.amplicons.values()
    }

    /// 扩增子去除引物后的插入区间 [fwd.end, rev.start)。
    pub fn insert_span(&self, amplicon: &Amplicon) -> (usize, usize) {
        (
            self.primers[amplicon.left].end,
            self.primers[amplicon.right].start,
        )
    }

    /// scheme 中出现的全部引物池名（有序去重），供输出头部的读组使用。
    pub fn pools(&self) -> Vec<&str> {
        let mut pools: Vec<&str> = self.primers.iter().map(|p| p.pool.as_str()).collect();
        pools.sort_unstable();
        pools.dedup();
        pools
    }
}
