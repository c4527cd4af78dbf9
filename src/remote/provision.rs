// opstool/src/remote/provision.rs
//
// Host bootstrap tasks. Each role gets the shared common sequence plus its
// own services; standalone tasks cover the pieces operators re-run alone.
// Config files pushed by Put steps live in the operator's local config/
// directory.
use crate::config::{DeployConfig, Role};

use super::Task;
use super::session::Step;

pub fn tasks(deploy: &DeployConfig) -> Vec<Task> {
    vec![
        Task {
            name: "setup-app",
            role: Role::App,
            summary: "Bootstrap an application host",
            steps: setup_app_steps(deploy),
        },
        Task {
            name: "setup-db",
            role: Role::Db,
            summary: "Bootstrap a database host",
            steps: setup_db_steps(deploy),
        },
        Task {
            name: "setup-task",
            role: Role::Task,
            summary: "Bootstrap a worker host",
            steps: setup_task_steps(deploy),
        },
        Task {
            name: "configure-nginx",
            role: Role::Web,
            summary: "Push nginx configuration and restart it",
            steps: configure_nginx_steps(),
        },
        Task {
            name: "setup-firewall",
            role: Role::Db,
            summary: "Lock the database host down to service ports",
            steps: firewall_steps(),
        },
    ]
}

fn setup_app_steps(deploy: &DeployConfig) -> Vec<Step> {
    let mut steps = common_steps(deploy);
    steps.push(Step::put("config/motd_app.txt", "/etc/motd.tail", true));
    steps.extend(app_server_steps());
    steps
}

fn setup_db_steps(deploy: &DeployConfig) -> Vec<Step> {
    let mut steps = common_steps(deploy);
    steps.push(Step::put("config/motd_db.txt", "/etc/motd.tail", true));
    steps.extend(firewall_steps());
    steps.extend(broker_steps());
    steps.extend(postgres_steps());
    steps.extend(mongo_steps());
    steps
}

fn setup_task_steps(deploy: &DeployConfig) -> Vec<Step> {
    let mut steps = common_steps(deploy);
    steps.push(Step::put("config/motd_task.txt", "/etc/motd.tail", true));
    steps.push(Step::put(
        "config/supervisor_worker.conf",
        "/etc/supervisor/conf.d/worker.conf",
        true,
    ));
    steps.push(Step::sudo("supervisorctl reload"));
    steps
}

fn common_steps(deploy: &DeployConfig) -> Vec<Step> {
    let mut steps = Vec::new();
    steps.extend(install_steps());
    steps.extend(user_steps());
    steps.extend(repo_steps(deploy));
    steps.extend(local_files_steps());
    steps.push(Step::sudo("apt-get -y install supervisor"));
    steps.push(Step::put("config/hosts", "/etc/hosts", true));
    steps.push(Step::put(
        "config/logrotate.conf",
        "/etc/logrotate.d/app",
        true,
    ));
    steps.push(Step::sudo(
        r#"su - root -c "echo \"deploy ALL=(ALL) NOPASSWD: ALL\" >> /etc/sudoers""#,
    ));
    steps.extend(nginx_steps());
    steps.extend(configure_nginx_steps());
    steps
}

fn install_steps() -> Vec<Step> {
    vec![
        Step::sudo("apt-get -y update"),
        Step::sudo("apt-get -y upgrade"),
        Step::sudo(
            "apt-get -y install build-essential gcc git curl wget ntp sysstat iotop zsh locate libpcre3-dev libssl-dev memcached monit munin-node",
        ),
        Step::put("config/munin.conf", "/etc/munin/munin.conf", true),
    ]
}

fn user_steps() -> Vec<Step> {
    vec![
        Step::run("mkdir -p ~/.ssh && chmod 700 ~/.ssh"),
        Step::run("rm -f ~/.ssh/id_rsa*"),
        Step::run("ssh-keygen -t rsa -f ~/.ssh/id_rsa -N \"\""),
        Step::run("touch ~/.ssh/authorized_keys"),
        Step::put("~/.ssh/id_rsa.pub", "authorized_keys", false),
        Step::run("cat authorized_keys >> ~/.ssh/authorized_keys && rm authorized_keys"),
    ]
}

fn repo_steps(deploy: &DeployConfig) -> Vec<Step> {
    vec![
        Step::run("mkdir -p ~/code"),
        Step::run(format!("git clone {} {}", deploy.repo_url, deploy.app_dir)),
        Step::run(format!("cd {} && cp .env.example .env", deploy.app_dir)),
        Step::run(format!(
            "cd {} && mkdir -p logs && touch logs/app.log",
            deploy.app_dir
        )),
    ]
}

fn local_files_steps() -> Vec<Step> {
    vec![
        Step::put("config/toprc", ".toprc", false),
        Step::put("config/zshrc", ".zshrc", false),
        Step::put("config/gitconfig", ".gitconfig", false),
        Step::put("config/ssh.conf", ".ssh/config", false),
    ]
}

const NGINX_VERSION: &str = "1.24.0";

fn nginx_steps() -> Vec<Step> {
    vec![
        Step::sudo("groupadd -f nginx"),
        Step::warn_only("sudo useradd -g nginx -d /var/www/htdocs -s /bin/false nginx"),
        Step::run(format!(
            "cd ~/code && wget http://nginx.org/download/nginx-{}.tar.gz",
            NGINX_VERSION
        )),
        Step::run(format!(
            "cd ~/code && tar -xzf nginx-{v}.tar.gz && rm nginx-{v}.tar.gz",
            v = NGINX_VERSION
        )),
        Step::run(format!(
            "cd ~/code/nginx-{} && ./configure --with-http_ssl_module --with-http_stub_status_module --with-http_gzip_static_module",
            NGINX_VERSION
        )),
        Step::run(format!("cd ~/code/nginx-{} && make", NGINX_VERSION)),
        Step::run(format!(
            "cd ~/code/nginx-{} && sudo make install",
            NGINX_VERSION
        )),
    ]
}

fn configure_nginx_steps() -> Vec<Step> {
    vec![
        Step::put(
            "config/nginx.conf",
            "/usr/local/nginx/conf/nginx.conf",
            true,
        ),
        Step::sudo("mkdir -p /usr/local/nginx/conf/sites-enabled"),
        Step::sudo("mkdir -p /var/log/nginx"),
        Step::put(
            "config/app.conf",
            "/usr/local/nginx/conf/sites-enabled/app.conf",
            true,
        ),
        Step::put("config/nginx-init", "/etc/init.d/nginx", true),
        Step::sudo("chmod 0755 /etc/init.d/nginx"),
        Step::sudo("/usr/sbin/update-rc.d -f nginx defaults"),
        Step::sudo("/etc/init.d/nginx restart"),
    ]
}

fn app_server_steps() -> Vec<Step> {
    vec![
        Step::put(
            "config/supervisor_app.conf",
            "/etc/supervisor/conf.d/app.conf",
            true,
        ),
        Step::sudo("supervisorctl reload"),
    ]
}

fn firewall_steps() -> Vec<Step> {
    vec![
        Step::sudo("ufw default deny"),
        Step::sudo("ufw allow ssh"),
        Step::sudo("ufw allow 5432"),  // PostgreSQL
        Step::sudo("ufw allow 27017"), // MongoDB
        Step::sudo("ufw allow 5672"),  // queue broker
        Step::sudo("ufw allow 11211"), // memcached
        Step::sudo("ufw enable"),
    ]
}

fn broker_steps() -> Vec<Step> {
    vec![
        Step::sudo(
            r#"sh -c 'echo "deb http://www.rabbitmq.com/debian/ testing main" >> /etc/apt/sources.list'"#,
        ),
        Step::run("wget http://www.rabbitmq.com/rabbitmq-signing-key-public.asc"),
        Step::sudo("apt-key add rabbitmq-signing-key-public.asc"),
        Step::run("rm rabbitmq-signing-key-public.asc"),
        Step::sudo("apt-get update"),
        Step::sudo("apt-get install -y rabbitmq-server"),
        Step::sudo("rabbitmqctl add_user app app"),
        Step::sudo("rabbitmqctl add_vhost appvhost"),
        Step::sudo(r#"rabbitmqctl set_permissions -p appvhost app ".*" ".*" ".*""#),
    ]
}

fn postgres_steps() -> Vec<Step> {
    vec![Step::sudo(
        "apt-get -y install postgresql postgresql-client postgresql-contrib libpq-dev",
    )]
}

fn mongo_steps() -> Vec<Step> {
    vec![
        Step::sudo("apt-get update"),
        Step::sudo("apt-get -y install mongodb-org"),
    ]
}
