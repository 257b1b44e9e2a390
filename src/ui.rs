// src/ui.rs

use crate::{
    classifier::{AnalysisReport, UrlClassification},
    constants, symbols, utils,
};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};

pub fn print_header(title: &str) {
    println!("\n{}", "═".repeat(constants::UI_WIDTH));
    println!(" {}", title.cyan().bold());
    println!("{}", "═".repeat(constants::UI_WIDTH));
}

pub fn print_sub_header(title: &str) {
    println!("\n--- {} ---", title.bold());
}

pub fn box_message(title: &str, content: &[&str], color_func: fn(ColoredString) -> ColoredString) {
    println!("\n┌{}┐", "─".repeat(constants::UI_WIDTH - 2));
    println!("  {}", color_func(title.bold()));
    println!("├{}┤", "─".repeat(constants::UI_WIDTH - 2));
    for line in content {
        println!("  {}", line);
    }
    println!("└{}┘", "─".repeat(constants::UI_WIDTH - 2));
}

pub fn plain(message: &str) {
    println!("{}", message);
}

pub fn info(message: &str) {
    println!("{} {}", *symbols::INFO, message);
}

pub fn warn(message: &str) {
    println!("{} {}", *symbols::WARN, message.yellow());
}

pub fn error(message: &str) {
    eprintln!("{} {}", *symbols::ERROR, message.red());
}

pub fn new_tasks_progress_bar(total: u64, prefix: &str) -> ProgressBar {
    let pbar = ProgressBar::new(total);
    let style = ProgressStyle::with_template(
        "{prefix:7.bold.cyan} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}/{len:3} ({percent:>3}%) [ETA: {eta}]",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("#>-");
    pbar.set_style(style);
    pbar.set_prefix(prefix.to_string());
    pbar
}

/// `--analyze` 的表格输出
pub fn print_analysis(classifications: &[UrlClassification], report: &AnalysisReport) {
    print_header("链接分析");
    println!(
        "  {:<42} {:<20} {:<8} {}",
        "链接".bold(),
        "域名".bold(),
        "复杂度".bold(),
        "策略".bold()
    );
    for c in classifications {
        let strategy = c.strategy.to_string();
        let strategy = match c.strategy {
            crate::classifier::Strategy::Direct => strategy.green(),
            crate::classifier::Strategy::Extractor => strategy.cyan(),
            crate::classifier::Strategy::BrowserAutomation => strategy.yellow(),
        };
        println!(
            "  {:<42} {:<20} {:<8} {}",
            utils::truncate_text(&c.url, constants::URL_TRUNCATE_LENGTH),
            utils::truncate_text(&c.domain, 20),
            c.complexity.to_string(),
            strategy
        );
    }

    print_sub_header("汇总");
    println!("  总链接数: {}", report.total_urls);
    println!("  直链视频: {}", report.direct_videos);
    println!("  流媒体平台: {}", report.streaming_platforms);
    let complexity: Vec<String> = report
        .complexity_distribution
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    println!("  复杂度分布: {}", complexity.join(", "));
    let strategy: Vec<String> = report
        .strategy_distribution
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect();
    println!("  策略分布: {}", strategy.join(", "));
    println!(
        "  预计成功率: {}",
        format!("{:.1}%", report.success_probability * 100.0).bold()
    );
}
