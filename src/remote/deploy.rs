// opstool/src/remote/deploy.rs
//
// Deployment and day-to-day operations tasks. Every task is a fixed linear
// command sequence; host selection comes from the task's role.
use crate::config::{DeployConfig, Role};

use super::Task;
use super::session::Step;

pub fn tasks(deploy: &DeployConfig) -> Vec<Task> {
    vec![
        Task {
            name: "deploy",
            role: Role::Web,
            summary: "Pull, reload the app server, warm the site",
            steps: deploy_steps(&deploy.app_dir, &deploy.site_url),
        },
        Task {
            name: "deploy-full",
            role: Role::Web,
            summary: "Pull, migrate, restart the app server, warm the site",
            steps: deploy_full_steps(&deploy.app_dir, &deploy.site_url),
        },
        Task {
            name: "staging",
            role: Role::Web,
            summary: "Deploy the staging checkout",
            steps: deploy_steps(&deploy.staging_dir, &deploy.staging_url),
        },
        Task {
            name: "staging-full",
            role: Role::Web,
            summary: "Deploy the staging checkout with migrations",
            steps: staging_full_steps(&deploy.staging_dir, &deploy.staging_url),
        },
        Task {
            name: "worker",
            role: Role::Task,
            summary: "Restart the background worker",
            steps: worker_steps(&deploy.app_dir),
        },
        Task {
            name: "force-worker",
            role: Role::Task,
            summary: "Kill worker processes outright after a pull",
            steps: force_worker_steps(&deploy.app_dir),
        },
        Task {
            name: "compress-media",
            role: Role::Web,
            summary: "Re-gzip compressed JS/CSS bundles",
            steps: compress_media_steps(&deploy.app_dir),
        },
        Task {
            name: "backup-postgres",
            role: Role::Db,
            summary: "Run the remote PostgreSQL backup script",
            steps: backup_postgres_steps(&deploy.app_dir),
        },
    ]
}

fn deploy_steps(dir: &str, site_url: &str) -> Vec<Step> {
    let mut steps = vec![
        Step::run(format!("cd {} && git pull", dir)),
        Step::run(format!("cd {} && kill -HUP `cat logs/app.pid`", dir)),
        Step::run(format!("curl -s {} > /dev/null", site_url)),
    ];
    steps.extend(compress_media_steps(dir));
    steps
}

fn deploy_full_steps(dir: &str, site_url: &str) -> Vec<Step> {
    let mut steps = vec![
        Step::run(format!("cd {} && git pull", dir)),
        Step::run(format!("cd {} && ./bin/migrate", dir)),
        Step::sudo("supervisorctl restart app"),
        Step::run(format!("curl -s {} > /dev/null", site_url)),
    ];
    steps.extend(compress_media_steps(dir));
    steps
}

// The staging checkout has no supervisor entry, so even the full deploy
// reloads by pidfile.
fn staging_full_steps(dir: &str, site_url: &str) -> Vec<Step> {
    let mut steps = vec![
        Step::run(format!("cd {} && git pull", dir)),
        Step::run(format!("cd {} && ./bin/migrate", dir)),
        Step::run(format!("cd {} && kill -HUP `cat logs/app.pid`", dir)),
        Step::run(format!("curl -s {} > /dev/null", site_url)),
    ];
    steps.extend(compress_media_steps(dir));
    steps
}

fn worker_steps(dir: &str) -> Vec<Step> {
    vec![
        Step::run(format!("cd {} && git pull", dir)),
        Step::sudo("supervisorctl stop worker"),
        Step::warn_only(format!("cd {} && ./bin/kill_workers.sh", dir)),
        Step::sudo("supervisorctl start worker"),
        Step::run(format!("cd {} && tail logs/app.log", dir)),
    ]
}

fn force_worker_steps(dir: &str) -> Vec<Step> {
    vec![
        Step::run(format!("cd {} && git pull", dir)),
        Step::run("ps aux | grep worker | egrep -v grep | awk '{print $2}' | sudo xargs kill -9"),
    ]
}

fn compress_media_steps(dir: &str) -> Vec<Step> {
    vec![
        Step::run(format!("cd {}/media/js && rm -f *.gz", dir)),
        Step::run(format!(
            "cd {}/media/js && for js in *-compressed-*.js; do gzip -9 $js -c > $js.gz; done",
            dir
        )),
        Step::run(format!("cd {}/media/css && rm -f *.gz", dir)),
        Step::run(format!(
            "cd {}/media/css && for css in *-compressed-*.css; do gzip -9 $css -c > $css.gz; done",
            dir
        )),
    ]
}

fn backup_postgres_steps(dir: &str) -> Vec<Step> {
    vec![Step::run(format!(
        "cd {}/utils/backups && ./postgresql_backup.sh",
        dir
    ))]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_deploy_config;
    use serde_json::json;

    fn default_deploy() -> DeployConfig {
        let raw = serde_json::from_value(json!({})).expect("empty config deserializes");
        load_deploy_config(&raw)
    }

    fn find<'a>(tasks: &'a [Task], name: &str) -> &'a Task {
        tasks
            .iter()
            .find(|t| t.name == name)
            .expect("task should exist")
    }

    #[test]
    fn test_deploy_pulls_first_then_reloads_and_warms() {
        let tasks = tasks(&default_deploy());
        let deploy = find(&tasks, "deploy");

        assert_eq!(deploy.role, Role::Web);
        assert_eq!(deploy.steps[0], Step::run("cd ~/app && git pull"));
        assert_eq!(
            deploy.steps[1],
            Step::run("cd ~/app && kill -HUP `cat logs/app.pid`")
        );
        assert!(matches!(&deploy.steps[2], Step::Run(cmd) if cmd.contains("curl -s")));
        // media compression runs last
        assert!(matches!(deploy.steps.last(), Some(Step::Run(cmd)) if cmd.contains("gzip -9")));
    }

    #[test]
    fn test_worker_restart_tolerates_the_kill_step_only() {
        let tasks = tasks(&default_deploy());
        let worker = find(&tasks, "worker");

        assert_eq!(worker.role, Role::Task);
        let warn_only: Vec<&Step> = worker
            .steps
            .iter()
            .filter(|s| matches!(s, Step::WarnOnly(_)))
            .collect();
        assert_eq!(warn_only.len(), 1);
        assert_eq!(
            warn_only[0],
            &Step::warn_only("cd ~/app && ./bin/kill_workers.sh")
        );
    }

    #[test]
    fn test_staging_targets_the_staging_checkout() {
        let tasks = tasks(&default_deploy());
        let staging = find(&tasks, "staging");
        for step in &staging.steps {
            if let Step::Run(cmd) = step {
                assert!(!cmd.contains("~/app/"), "staging must not touch ~/app: {}", cmd);
            }
        }
        assert_eq!(staging.steps[0], Step::run("cd ~/staging && git pull"));
    }

    #[test]
    fn test_backup_postgres_runs_on_db_hosts() {
        let tasks = tasks(&default_deploy());
        let backup = find(&tasks, "backup-postgres");
        assert_eq!(backup.role, Role::Db);
        assert_eq!(backup.steps.len(), 1);
    }
}
