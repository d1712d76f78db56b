use std::collections::HashMap;

/// 深度分组键：扩增子编号 + 链方向。
pub type GroupKey = (String, bool);

/// 每组已放行的计数。按运行显式创建、显式传入流水线，
/// 多个独立运行（尤其测试）之间互不干扰。
#[derive(Debug, Default)]
pub struct NormalizationState {
    counts: HashMap<GroupKey, u32>,
}

impl NormalizationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// 尝试放行一条属于 `key` 组的记录。`max_depth` 为 None 时不设上限。
    pub fn admit(&mut self, key: &GroupKey, max_depth: Option<u32>) -> bool {
        let count = self.counts.entry(key.clone()).or_insert(0);
        if let Some(depth) = max_depth {
            if *count >= depth {
                return false;
            }
        }
        *count += 1;
        true
    }

    pub fn count(&self, key: &GroupKey) -> u32 {
        self.counts.get(key).copied().unwrap_or(0)
    }
}

/// 暂存的记录：输入序号用于恢复稳定输出顺序。
#[derive(Debug)]
pub struct Pending<T> {
    pub ordinal: u64,
    pub group: Option<GroupKey>,
    pub payload: T,
}

/// 归一化结果：按输入顺序逐条给出去留。
#[derive(Debug)]
pub struct Resolved<T> {
    pub pending: Pending<T>,
    pub kept: bool,
}

/// 两种执行模式，同一放行接口、构建时按配置选定：
/// 未设上限 → 流式直通；设了上限 → 缓冲到输入结束后按组放行前 D 条。
#[derive(Debug)]
pub enum Normalizer<T> {
    Streaming,
    Buffered { max_depth: u32, pending: Vec<Pending<T>> },
}

impl<T> Normalizer<T> {
    pub fn new(max_depth: Option<u32>) -> Self {
        match max_depth {
            None => Self::Streaming,
            Some(depth) => Self::Buffered { max_depth: depth, pending: Vec::new() },
        }
    }

    /// 流式模式立即返回待输出的负载；缓冲模式暂存并返回 None。
    pub fn offer(
        &mut self,
        ordinal: u64,
        group: Option<GroupKey>,
        payload: T,
        state: &mut NormalizationState,
    ) -> Option<T> {
        match self {
            Self::Streaming => {
                if let Some(key) = &group {
                    state.admit(key, None);
                }
                Some(payload)
            }
            Self::Buffered { pending, .. } => {
                pending.push(Pending { ordinal, group, payload });
                None
            }
        }
    }

    /// 输入结束：缓冲模式按输入顺序裁决每条记录。每组放行前 `max_depth`
    /// 条（同一输入必然选中同一批），无扩增子归属的记录不参与限深。
    pub fn finish(self, state: &mut NormalizationState) -> Vec<Resolved<T>> {
        match self {
            Self::Streaming => Vec::new(),
            Self::Buffered { max_depth, pending } => pending
                .into_iter()
                .map(|p| {
                    let kept = match &p.group {
                        Some(key) => state.admit(key, Some(max_depth)),
                        None => true,
                    };
                    Resolved { pending: p, kept }
                })
                .collect(),
        }
    }
}
