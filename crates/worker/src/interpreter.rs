use std::path::PathBuf;

use judge_core::{JudgeError, JudgeResult};
use tracing::debug;

/// 返回第一个能在 PATH 中找到的解释器
pub fn resolve_interpreter(candidates: &[String]) -> JudgeResult<PathBuf> {
    for candidate in candidates.iter().filter(|c| !c.trim().is_empty()) {
        match which::which(candidate) {
            Ok(path) => {
                debug!("使用解释器: {} -> {}", candidate, path.display());
                return Ok(path);
            }
            Err(e) => debug!("未找到解释器 {}: {}", candidate, e),
        }
    }

    Err(JudgeError::Spawn(format!(
        "Python interpreter not found (tried: {})",
        candidates.join(", ")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn test_first_available_candidate_wins() {
        let candidates = vec![
            "definitely-not-an-interpreter-7f3a".to_string(),
            "sh".to_string(),
        ];
        let path = resolve_interpreter(&candidates).unwrap();
        assert!(path.ends_with("sh"));
    }

    #[test]
    fn test_no_candidate_found() {
        let candidates = vec!["definitely-not-an-interpreter-7f3a".to_string()];
        let err = resolve_interpreter(&candidates).unwrap_err();
        assert!(matches!(err, JudgeError::Spawn(_)));
        assert!(err.to_string().contains("definitely-not-an-interpreter-7f3a"));
    }
}
