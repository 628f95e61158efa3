use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use judge_api::{create_app, AppState};
use judge_core::{AppConfig, SlidingWindowLimiter};
use judge_dispatcher::ModelDispatcher;
use judge_domain::ports::{ConcurrencySlotManager, TokenIssuer};
use judge_domain::entities::ModelConfig;
use judge_domain::repositories::{ModelConfigRepository, TaskRepository};
use judge_infrastructure::{
    InMemoryModelConfigRepository, InMemorySlotManager, InMemoryTaskRepository, JwtTokenIssuer,
    RedisSlotManager, SqliteModelConfigRepository, SqliteTaskRepository,
};
use judge_worker::{EvaluationTaskSupervisor, SupervisorSettings};
use tokio::net::TcpListener;
use tracing::{info, warn};

use crate::shutdown::ShutdownManager;

/// 主应用程序
pub struct Application {
    config: AppConfig,
    state: AppState,
    supervisor: Arc<EvaluationTaskSupervisor>,
    shutdown: ShutdownManager,
}

impl Application {
    /// 根据配置组装各组件
    pub async fn new(config: AppConfig, shutdown: ShutdownManager) -> Result<Self> {
        info!("初始化应用程序");

        let slots = create_slot_manager(&config).await?;
        let (repository, model_configs) = create_repositories(&config).await?;

        let issuer: Arc<dyn TokenIssuer> = Arc::new(JwtTokenIssuer::new(
            &config.auth.jwt_secret,
            config.auth.token_expiration_hours,
        ));

        let dispatcher = ModelDispatcher::new(slots, &config.dispatcher, shutdown.subscribe())
            .context("创建模型调用分发器失败")?;

        let supervisor = Arc::new(EvaluationTaskSupervisor::new(
            repository,
            model_configs,
            Arc::clone(&issuer),
            SupervisorSettings::from_config(&config.supervisor, &config.auth),
        ));

        let limiter = config.rate_limit.enabled.then(|| {
            Arc::new(SlidingWindowLimiter::new(
                config.rate_limit.window(),
                config.rate_limit.max_requests,
            ))
        });

        if !config.auth.enabled {
            warn!("API认证已关闭，所有请求使用匿名身份");
        } else if config.auth.uses_default_secret() {
            warn!("auth.jwt_secret 仍为内置默认值，任何人都可以签发有效凭证，请通过配置文件或 JUDGE__AUTH__JWT_SECRET 替换");
        }

        let state = AppState {
            dispatcher: Arc::new(dispatcher),
            supervisor: Arc::clone(&supervisor),
            issuer,
            limiter,
            auth_enabled: config.auth.enabled,
        };

        Ok(Self {
            config,
            state,
            supervisor,
            shutdown,
        })
    }

    /// 运行HTTP服务直到收到关闭信号，然后终止所有评测进程
    pub async fn run(self) -> Result<()> {
        let bind_address = &self.config.server.bind_address;
        let listener = TcpListener::bind(bind_address)
            .await
            .with_context(|| format!("绑定地址失败: {bind_address}"))?;

        info!("API服务器启动在 http://{}", bind_address);

        let app = create_app(self.state, &self.config.server);
        let shutdown = self.shutdown.subscribe();

        let served = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("API服务器运行失败");

        info!("API服务器已停止，开始终止运行中的评测任务");
        self.supervisor.shutdown().await;

        served
    }
}

async fn create_slot_manager(config: &AppConfig) -> Result<Arc<dyn ConcurrencySlotManager>> {
    if !config.redis.enabled {
        info!("未启用Redis，使用进程内并发计数");
        return Ok(Arc::new(InMemorySlotManager::new()));
    }

    let manager = RedisSlotManager::new(&config.redis.url, config.redis.key_ttl_seconds)
        .context("创建Redis并发计数失败")?;

    if manager.ping().await {
        info!("已连接Redis计数服务");
    } else {
        warn!("Redis计数服务当前不可用，模型调用将在恢复前降级为直接调用");
    }

    Ok(Arc::new(manager))
}

type Repositories = (Arc<dyn TaskRepository>, Arc<dyn ModelConfigRepository>);

async fn create_repositories(config: &AppConfig) -> Result<Repositories> {
    let seeds = config.models.iter().cloned().map(ModelConfig::from);

    if config.database.is_in_memory() {
        warn!("使用内存任务存储，重启后任务记录将丢失");
        return Ok((
            Arc::new(InMemoryTaskRepository::new()),
            Arc::new(InMemoryModelConfigRepository::with_configs(seeds)),
        ));
    }

    let tasks =
        SqliteTaskRepository::connect(&config.database.url, config.database.max_connections)
            .await
            .with_context(|| format!("连接任务数据库失败: {}", config.database.url))?;

    let model_configs = SqliteModelConfigRepository::new(tasks.pool().clone());
    model_configs
        .run_migrations()
        .await
        .context("初始化模型配置表失败")?;

    for seed in seeds {
        let existing = model_configs
            .get_model_config_by_name(&seed.model_name)
            .await
            .with_context(|| format!("读取模型配置失败: {}", seed.model_name))?;
        if existing.is_some() {
            continue;
        }
        model_configs
            .create_model_config(&seed)
            .await
            .with_context(|| format!("写入模型配置失败: {}", seed.model_name))?;
        info!("已写入模型配置: {}", seed.model_name);
    }

    info!("任务数据库已就绪: {}", config.database.url);
    Ok((Arc::new(tasks), Arc::new(model_configs)))
}
