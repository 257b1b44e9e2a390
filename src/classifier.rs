// src/classifier.rs

//! URL 分类：决定每个链接走哪条提取路径。纯函数，无 I/O。

use crate::{constants, utils};
use serde::Serialize;
use std::collections::BTreeMap;
use strum_macros::Display;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Complexity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Strategy {
    Direct,
    Extractor,
    BrowserAutomation,
}

impl Strategy {
    /// 各提取路径的经验成功率
    pub fn success_weight(self) -> f64 {
        match self {
            Strategy::Direct => 0.95,
            Strategy::Extractor => 0.85,
            Strategy::BrowserAutomation => 0.60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrlClassification {
    pub url: String,
    pub domain: String,
    pub is_direct_video: bool,
    pub is_known_streaming_domain: bool,
    pub complexity: Complexity,
    pub strategy: Strategy,
}

fn is_direct_video_path(url: &str) -> bool {
    let path = match Url::parse(url) {
        Ok(parsed) => parsed.path().to_lowercase(),
        // 无法解析时退化为去掉查询串后的原始文本
        Err(_) => url.split(['?', '#']).next().unwrap_or_default().to_lowercase(),
    };
    constants::VIDEO_EXTENSIONS
        .iter()
        .any(|ext| path.ends_with(&format!(".{}", ext)))
}

pub fn classify_url(url: &str) -> UrlClassification {
    let domain = utils::domain_of(url);
    let is_direct_video = is_direct_video_path(url);
    let is_known_streaming_domain = constants::STREAMING_DOMAINS.contains(&domain.as_str());

    let (complexity, strategy) = if is_direct_video {
        (Complexity::Low, Strategy::Direct)
    } else if is_known_streaming_domain {
        (Complexity::Medium, Strategy::Extractor)
    } else {
        (Complexity::High, Strategy::BrowserAutomation)
    };

    UrlClassification {
        url: url.to_string(),
        domain,
        is_direct_video,
        is_known_streaming_domain,
        complexity,
        strategy,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub total_urls: usize,
    pub direct_videos: usize,
    pub streaming_platforms: usize,
    pub complexity_distribution: BTreeMap<Complexity, usize>,
    pub strategy_distribution: BTreeMap<Strategy, usize>,
    pub success_probability: f64,
}

pub fn classify_batch(urls: &[String]) -> Vec<UrlClassification> {
    urls.iter().map(|u| classify_url(u)).collect()
}

pub fn analysis_report(classifications: &[UrlClassification]) -> AnalysisReport {
    let mut complexity_distribution = BTreeMap::new();
    let mut strategy_distribution = BTreeMap::new();
    for c in classifications {
        *complexity_distribution.entry(c.complexity).or_insert(0) += 1;
        *strategy_distribution.entry(c.strategy).or_insert(0) += 1;
    }

    let success_probability = if classifications.is_empty() {
        0.0
    } else {
        classifications
            .iter()
            .map(|c| c.strategy.success_weight())
            .sum::<f64>()
            / classifications.len() as f64
    };

    AnalysisReport {
        total_urls: classifications.len(),
        direct_videos: classifications.iter().filter(|c| c.is_direct_video).count(),
        streaming_platforms: classifications
            .iter()
            .filter(|c| c.is_known_streaming_domain)
            .count(),
        complexity_distribution,
        strategy_distribution,
        success_probability,
    }
}
