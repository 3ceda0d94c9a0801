//! ComponentRouter 演示程序 - 配置驱动运行
//!
//! 在同一进程里模拟两个应用进程：主进程持有用户模块，支付进程通过通道暴露路由服务。

use component_router::{
    config::generate_default_config_file, initialize_with_config, ActionProcessor, ActionResult,
    AppContext, Caches, ConfigManager, Interceptor, InterceptorCallback, InterruptReason,
    Lifecycle, NavigationOutcome, Postman, RemoteRouteService, Result, RouteBean, RouteLauncher,
    RouteResult, RouteServiceHost, RouteType, Router, RouterConfig,
};
use std::env;
use std::path::Path;
use std::sync::Arc;

const DEFAULT_CONFIG_PATH: &str = "route_config.yaml";

/// 程序入口点
#[tokio::main]
async fn main() {
    match run_main().await {
        Ok(_) => {}
        Err(e) => {
            tracing::error!("❌ 程序运行失败: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run_main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.len() {
        1 => run_demo(ConfigManager::new_default()).await,
        2 => match args[1].as_str() {
            "init" => generate_config_file().await,
            path => {
                if !Path::new(path).exists() {
                    eprintln!("配置文件不存在: {}，使用 'route_demo init' 生成默认配置文件", path);
                    return Ok(());
                }
                run_demo(ConfigManager::load_from_file(path).await?).await
            }
        },
        _ => {
            print_usage();
            Ok(())
        }
    }
}

/// 主进程的页面打开能力
struct ConsoleLauncher;

impl RouteLauncher for ConsoleLauncher {
    fn launch(&self, context: &AppContext, postman: &Postman) -> anyhow::Result<Option<RouteResult>> {
        tracing::info!(
            "📱 [{}] open {} ({}) with {} extras",
            context,
            postman.key(),
            postman.class_name(),
            postman.payload().len()
        );
        let opened: RouteResult = Arc::new(format!("opened {}", postman.key()));
        Ok(Some(opened))
    }
}

/// 支付进程的余额行为
struct WalletActions;

impl ActionProcessor for WalletActions {
    fn do_action(&self, action_name: &str) -> anyhow::Result<Option<ActionResult>> {
        match action_name {
            "balance" => Ok(Some(ActionResult::transferable(1024_i64))),
            other => anyhow::bail!("unsupported wallet action {}", other),
        }
    }
}

/// 未登录时拦截支付进程里的 `pay/checkout`
struct LoginInterceptor;

impl Interceptor for LoginInterceptor {
    fn matches(&self, postman: &Postman) -> bool {
        postman.group() == "pay" && postman.path() == "checkout"
    }

    fn on_intercept(&self, _: &AppContext, postman: Arc<Postman>, callback: Arc<dyn InterceptorCallback>) {
        if postman.payload().get_as::<bool>("logged_in").unwrap_or(false) {
            callback.on_continue(&postman);
        } else {
            callback.on_interrupt(&postman, InterruptReason::new(401, "login required"));
        }
    }
}

fn pay_process(config: &RouterConfig) -> Result<RouteServiceHost> {
    let caches = Arc::new(Caches::new());
    caches.register_routes(
        "pay",
        vec![
            RouteBean::new("pay", "wallet")
                .with_type(RouteType::ActionProcessor)
                .with_class_name("pay::WalletActions"),
            RouteBean::new("pay", "checkout")
                .with_type(RouteType::Activity)
                .with_class_name("pay::CheckoutPage"),
        ],
    );
    caches.register_action("pay::WalletActions", || Ok(WalletActions));
    caches.add_interceptor(Arc::new(LoginInterceptor));

    let context = AppContext::new("com.example.pay").with_process_name("com.example.pay:remote");
    RouteServiceHost::spawn(Arc::new(RemoteRouteService::new(caches, context)), config.host_threads)
}

async fn run_demo(config_manager: ConfigManager) -> Result<()> {
    config_manager.validate()?;
    let config = config_manager.get_config();
    initialize_with_config(config).await?;

    let caches = Arc::new(Caches::new());
    caches.register_routes(
        "user",
        vec![RouteBean::new("user", "profile")
            .with_type(RouteType::Activity)
            .with_class_name("user::ProfilePage")],
    );
    let router = Arc::new(Router::from_config(config, caches));
    router.set_launcher(Arc::new(ConsoleLauncher));

    let host = pay_process(config)?;
    let pay_service = Arc::new(host.connect());
    router.publish_to(pay_service.as_ref());
    router.add_remote_service(pay_service);

    let page = Lifecycle::new("MainPage");
    let requests = vec![
        Postman::new("user", "profile").with_long("uid", 7),
        Postman::new("pay", "wallet").with_route_action("balance"),
        Postman::new("pay", "checkout").with_boolean("logged_in", false),
        Postman::new("pay", "checkout").with_boolean("logged_in", true),
        Postman::new("user", "missing"),
    ];

    for postman in requests {
        let key = postman.key();
        let postman = postman
            .bind_lifecycle(&page)
            .add_on_result_callback(|result: Option<Arc<String>>| {
                if let Some(result) = result {
                    tracing::info!("✅ result: {}", result);
                }
            })
            .add_on_result_callback(|result: Option<Arc<i64>>| {
                if let Some(result) = result {
                    tracing::info!("💰 balance: {}", result);
                }
            })
            .do_on_interrupt(|postman: &Postman, reason: &InterruptReason| {
                tracing::warn!("⛔ {} interrupted: {} ({})", postman.key(), reason.message, reason.code);
            });

        match router.clone().navigation_async(postman).await {
            NavigationOutcome::Completed => tracing::info!("{} completed", key),
            other => tracing::info!("{} finished with {:?}", key, other),
        }
    }

    page.destroy();
    tracing::info!("🎉 演示完成");
    Ok(())
}

async fn generate_config_file() -> Result<()> {
    tracing_subscriber::fmt::init();
    tracing::info!("📝 生成默认配置文件: {}", DEFAULT_CONFIG_PATH);
    generate_default_config_file(DEFAULT_CONFIG_PATH).await?;
    tracing::info!("🔧 请编辑配置文件后运行: route_demo {}", DEFAULT_CONFIG_PATH);
    Ok(())
}

fn print_usage() {
    println!("ComponentRouter 演示程序");
    println!();
    println!("用法:");
    println!("  route_demo                    # 使用默认配置运行");
    println!("  route_demo init               # 生成默认配置文件");
    println!("  route_demo <config_file>      # 使用指定配置文件运行");
}
