use std::time::Duration;

use {
    gatehouse_common::{Clock, SystemClock},
    gatehouse_config::GatehouseConfig,
    gatehouse_sanctions::{
        parse::humanize, store::SanctionStore, store_sqlite::SqliteSanctionStore,
        types::PendingAction,
    },
    sqlx::SqlitePool,
    tracing::info,
};

/// Open the configured database and bring both schemas up to date.
pub async fn open_pool(config: &GatehouseConfig) -> anyhow::Result<SqlitePool> {
    let pool = SqlitePool::connect(&config.bot.database_url).await?;
    gatehouse_sanctions::run_migrations(&pool).await?;
    gatehouse_interviews::run_migrations(&pool).await?;
    info!(url = %config.bot.database_url, "database ready");
    Ok(pool)
}

pub async fn migrate(config: &GatehouseConfig) -> anyhow::Result<()> {
    let pool = open_pool(config).await?;
    pool.close().await;
    println!("Migrations applied to {}", config.bot.database_url);
    Ok(())
}

pub async fn pending(config: &GatehouseConfig) -> anyhow::Result<()> {
    let pool = open_pool(config).await?;
    let store = SqliteSanctionStore::with_pool(pool.clone());
    let mut actions = store.list_actions().await?;
    pool.close().await;

    if actions.is_empty() {
        println!("No pending sanctions.");
        return Ok(());
    }

    actions.sort_by_key(|a| a.expires_at_ms);
    let now = SystemClock.now_ms();
    for action in &actions {
        println!("{}", describe(action, now));
    }
    Ok(())
}

fn describe(action: &PendingAction, now_ms: u64) -> String {
    let remaining = if action.expires_at_ms <= now_ms {
        "overdue".to_string()
    } else {
        format!(
            "in {}",
            humanize(Duration::from_millis(action.expires_at_ms - now_ms))
        )
    };
    format!(
        "{}  {:<8} user {}  reverts {}",
        action.id,
        action.kind.as_str(),
        action.applicant,
        remaining
    )
}
