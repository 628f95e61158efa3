//! 从评测进程的标准输出推断进度
//!
//! 支持两种格式：旧版评测脚本输出的中文阶段提示，以及结构化的
//! `@@progress {"stage":"scoring","message":"..."}` 行。其他输出仅用于日志。

use serde::Deserialize;

/// 结构化进度行的前缀
pub const PROGRESS_PREFIX: &str = "@@progress";

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub progress: f64,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Loaded,
    Generating,
    Scoring,
    SavingReport,
}

impl Stage {
    pub fn progress(&self) -> f64 {
        match self {
            Stage::Loaded => 10.0,
            Stage::Generating => 50.0,
            Stage::Scoring => 70.0,
            Stage::SavingReport => 90.0,
        }
    }

    pub fn default_message(&self) -> &'static str {
        match self {
            Stage::Loaded => "Data loaded",
            Stage::Generating => "Getting model outputs",
            Stage::Scoring => "Scoring",
            Stage::SavingReport => "Saving reports",
        }
    }

    fn update(&self, message: Option<String>) -> ProgressUpdate {
        ProgressUpdate {
            progress: self.progress(),
            message: message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or_else(|| self.default_message().to_string()),
        }
    }
}

const LEGACY_MARKERS: [(&str, Stage); 4] = [
    ("加载完成，共", Stage::Loaded),
    ("获取模型输出:", Stage::Generating),
    ("评分处理:", Stage::Scoring),
    ("保存报告", Stage::SavingReport),
];

#[derive(Debug, Deserialize)]
struct ProgressLine {
    stage: Stage,
    #[serde(default)]
    message: Option<String>,
}

pub fn infer_progress(line: &str) -> Option<ProgressUpdate> {
    let trimmed = line.trim();

    if let Some(payload) = trimmed.strip_prefix(PROGRESS_PREFIX) {
        return serde_json::from_str::<ProgressLine>(payload.trim())
            .ok()
            .map(|parsed| parsed.stage.update(parsed.message));
    }

    LEGACY_MARKERS
        .iter()
        .find(|(marker, _)| trimmed.contains(marker))
        .map(|(_, stage)| stage.update(None))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legacy_markers() {
        let update = infer_progress("加载完成，共 1200 条数据").unwrap();
        assert_eq!(update.progress, 10.0);
        assert_eq!(update.message, "Data loaded");

        let update = infer_progress("获取模型输出: 35%|███▌      | 420/1200").unwrap();
        assert_eq!(update.progress, 50.0);

        // 行内数字不影响进度
        let update = infer_progress("评分处理: 999/1000").unwrap();
        assert_eq!(update.progress, 70.0);
        assert_eq!(update.message, "Scoring");

        assert_eq!(infer_progress("正在保存报告...").unwrap().progress, 90.0);
    }

    #[test]
    fn test_structured_lines() {
        let update = infer_progress(r#"@@progress {"stage":"generating"}"#).unwrap();
        assert_eq!(update.progress, 50.0);
        assert_eq!(update.message, "Getting model outputs");

        let update =
            infer_progress(r#"@@progress {"stage":"saving_report","message":"writing badcases"}"#)
                .unwrap();
        assert_eq!(update.progress, 90.0);
        assert_eq!(update.message, "writing badcases");
    }

    #[test]
    fn test_other_lines_are_diagnostic_only() {
        assert!(infer_progress("INFO worker started").is_none());
        assert!(infer_progress("").is_none());
        assert!(infer_progress(r#"@@progress {"stage":"unknown"}"#).is_none());
        assert!(infer_progress("@@progress not-json").is_none());
    }
}
