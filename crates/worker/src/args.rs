//! 评测进程命令行参数

use judge_domain::evaluation::EvaluationConfig;

/// 构建评测进程参数（不含脚本路径），顺序与格式固定
pub fn build_worker_args(
    user_id: i64,
    task_id: &str,
    config: &EvaluationConfig,
    database_service_url: &str,
    auth_token: &str,
) -> Vec<String> {
    let mut args = Vec::with_capacity(48);

    args.push("--api_urls".to_string());
    args.extend(config.api_urls.iter().cloned());

    args.push("--model".to_string());
    args.push(config.model.clone());

    args.push("--data_id".to_string());
    args.push(config.data_file.clone());

    args.push("--scoring".to_string());
    args.push(config.scoring.clone());

    args.push("--scoring_module".to_string());
    args.push(config.scoring_module.clone());

    args.push("--max_workers".to_string());
    args.push(config.max_workers.to_string());

    args.push("--badcase_threshold".to_string());
    args.push(format!("{:.2}", config.badcase_threshold));

    args.push("--report_format".to_string());
    args.push(config.report_format.clone());

    args.push("--role".to_string());
    args.push(config.role.clone());

    args.push("--timeout".to_string());
    args.push(config.timeout.to_string());

    args.push("--max-tokens".to_string());
    args.push(config.max_tokens.to_string());

    args.push("--api_key".to_string());
    args.push(config.api_key.clone());

    args.push("--temperature".to_string());
    args.push(format!("{:.1}", config.temperature()));

    args.push("--top-p".to_string());
    args.push(format!("{:.2}", config.top_p()));

    args.push("--output_json".to_string());

    args.push("--user_id".to_string());
    args.push(user_id.to_string());

    args.push("--task_id".to_string());
    args.push(task_id.to_string());

    args.push("--database_service_url".to_string());
    args.push(database_service_url.to_string());

    if config.is_vllm {
        args.push("--is_vllm".to_string());
    }

    if config.test_mode {
        args.push("--test-mode".to_string());
    }

    if config.sample_size > 0 {
        args.push("--sample-size".to_string());
        args.push(config.sample_size.to_string());
    }

    if !config.checkpoint_path.is_empty() {
        args.push("--checkpoint_path".to_string());
        args.push(config.checkpoint_path.clone());
        args.push("--checkpoint_interval".to_string());
        args.push(config.checkpoint_interval.to_string());
    }

    if config.resume {
        args.push("--resume".to_string());
    }

    args.push("--auth_token".to_string());
    args.push(auth_token.to_string());

    args
}
