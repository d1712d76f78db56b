//! # ampliclip
//!
//! 面向扩增子测序（amplicon sequencing）比对结果的引物剪切工具。
//!
//! 本 crate 按已知引物坐标 scheme 对 BAM 中的比对记录做软掩蔽剪切，包括：
//!
//! - **scheme 构建**：从引物 BED 加载、合并备选引物并配对扩增子
//! - **引物匹配**：按参考坐标二分查找 read 两端最近的引物
//! - **软掩蔽剪切**：把引物覆盖的比对碱基改写为 soft clip，保持 read 长度不变
//! - **深度归一化**：按扩增子/方向组限制输出深度（可选）
//!
//! ## 快速示例
//!
//! ```rust,no_run
//! use ampliclip::io::bed::BedReader;
//! use ampliclip::scheme::PrimerScheme;
//! use ampliclip::trim::matcher::PrimerMatcher;
//!
//! # fn main() -> anyhow::Result<()> {
//! let file = std::fs::File::open("primer.bed")?;
//! let mut reader = BedReader::new(std::io::BufReader::new(file));
//! let scheme = PrimerScheme::load(&reader.read_all()?)?;
//!
//! let matcher = PrimerMatcher::new(&scheme, 35);
//! let result = matcher.match_read("MN908947.3", 54, 385);
//! if let Some(m) = result.left {
//!     println!("5' primer: {} (distance {})", m.primer.name, m.distance);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## 模块说明
//!
//! - [`io`] — 引物 BED 解析与报告输出
//! - [`scheme`] — 引物 / 扩增子数据模型与按位置排序的查询索引
//! - [`trim`] — 匹配、软掩蔽、深度归一化与流水线驱动

pub mod io;
pub mod scheme;
pub mod trim;
