pub(crate) mod deploy;
pub(crate) mod provision;
pub(crate) mod session;

use anyhow::{Context, Result};

use crate::config::{AppConfig, DeployConfig, Role, SshConfig, load_deploy_config, load_ssh_config};
use crate::utils::log;
use session::RemoteSession;
pub use session::Step;

/// A named remote task: a fixed linear sequence of steps executed against
/// every host of one role.
pub struct Task {
    pub name: &'static str,
    pub role: Role,
    pub summary: &'static str,
    pub steps: Vec<Step>,
}

/// Full task catalog for the configured deployment.
pub fn catalog(deploy_config: &DeployConfig) -> Vec<Task> {
    let mut tasks = deploy::tasks(deploy_config);
    tasks.extend(provision::tasks(deploy_config));
    tasks
}

/// Looks the task up by name and runs it against every host of its role,
/// host by host, step by step. The first failing step aborts the task and
/// the process exit code reflects it.
pub async fn run_task(app_config: &AppConfig, name: &str) -> Result<()> {
    let deploy_config = load_deploy_config(&app_config.raw);
    let task = catalog(&deploy_config)
        .into_iter()
        .find(|t| t.name == name)
        .with_context(|| format!("Unknown task: {}", name))?;

    let ssh_config = load_ssh_config(&app_config.raw)?;
    let hosts = app_config.hosts_for(task.role)?.to_vec();

    // ssh2 is blocking; keep it off the async runtime.
    tokio::task::spawn_blocking(move || execute(task, hosts, ssh_config))
        .await
        .context("Remote task worker panicked")?
}

fn execute(task: Task, hosts: Vec<String>, ssh_config: SshConfig) -> Result<()> {
    for host in &hosts {
        log::info(&format!("---> [{}] running task [{}]", host, task.name));
        let session = RemoteSession::connect(host, &ssh_config)?;
        for step in &task.steps {
            session.apply(step)?;
        }
        println!("✓ {} completed on {}", task.name, host);
    }
    Ok(())
}
