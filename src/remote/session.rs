// opstool/src/remote/session.rs
use anyhow::{Context, Result};
use ssh2::Session;
use std::io::{Read, Write};
use std::net::TcpStream;
use std::path::{Path, PathBuf};

use crate::config::SshConfig;

/// One step of a remote task. Tasks are fixed linear sequences; the only
/// tolerated deviation is `WarnOnly`, which suppresses its own failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Run a command, failing the task on non-zero exit.
    Run(String),
    /// Run a command under sudo, failing the task on non-zero exit.
    Sudo(String),
    /// Run a command, logging a warning instead of failing on non-zero exit.
    WarnOnly(String),
    /// Upload a local file. With `sudo`, the file is staged in /tmp and
    /// moved into place with elevated rights.
    Put {
        local: String,
        remote: String,
        sudo: bool,
    },
}

impl Step {
    pub fn run(cmd: impl Into<String>) -> Step {
        Step::Run(cmd.into())
    }

    pub fn sudo(cmd: impl Into<String>) -> Step {
        Step::Sudo(cmd.into())
    }

    pub fn warn_only(cmd: impl Into<String>) -> Step {
        Step::WarnOnly(cmd.into())
    }

    pub fn put(local: impl Into<String>, remote: impl Into<String>, sudo: bool) -> Step {
        Step::Put {
            local: local.into(),
            remote: remote.into(),
            sudo,
        }
    }
}

/// sudo needs -S when the password is piped over the channel instead of a
/// tty prompt.
pub fn rewrite_sudo(cmd: &str, pipe_password: bool) -> String {
    if pipe_password {
        cmd.replace("sudo ", "sudo -S ")
    } else {
        cmd.to_string()
    }
}

/// Expands a leading `~/` against the operator's home directory so Put
/// steps can reference local dotfiles the way the task catalog writes them.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

/// An authenticated SSH session against one host of a role.
pub struct RemoteSession {
    session: Session,
    host: String,
    password: Option<String>,
}

impl RemoteSession {
    pub fn connect(host: &str, ssh_config: &SshConfig) -> Result<Self> {
        let tcp = TcpStream::connect((host, ssh_config.port))
            .with_context(|| format!("Failed to reach {}:{}", host, ssh_config.port))?;
        let mut session = Session::new().context("Failed to create SSH session")?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .with_context(|| format!("SSH handshake with {} failed", host))?;

        match &ssh_config.password {
            Some(password) => session
                .userauth_password(&ssh_config.user, password)
                .with_context(|| {
                    format!(
                        "Password authentication for {}@{} failed",
                        ssh_config.user, host
                    )
                })?,
            None => session.userauth_agent(&ssh_config.user).with_context(|| {
                format!(
                    "Agent authentication for {}@{} failed",
                    ssh_config.user, host
                )
            })?,
        }
        if !session.authenticated() {
            anyhow::bail!("SSH authentication for {}@{} failed", ssh_config.user, host);
        }

        Ok(RemoteSession {
            session,
            host: host.to_string(),
            password: ssh_config.password.clone(),
        })
    }

    pub fn apply(&self, step: &Step) -> Result<()> {
        match step {
            Step::Run(cmd) => {
                self.exec_checked(cmd)?;
                Ok(())
            }
            Step::Sudo(cmd) => {
                self.exec_checked(&format!("sudo {}", cmd))?;
                Ok(())
            }
            Step::WarnOnly(cmd) => {
                if let Err(e) = self.exec_checked(cmd) {
                    println!(
                        "Warning: command failed on {} (tolerated): {:#}",
                        self.host, e
                    );
                }
                Ok(())
            }
            Step::Put {
                local,
                remote,
                sudo,
            } => self.put(local, remote, *sudo),
        }
    }

    fn exec_checked(&self, cmd: &str) -> Result<String> {
        let cmd = rewrite_sudo(cmd, self.password.is_some());
        let mut channel = self
            .session
            .channel_session()
            .with_context(|| format!("Failed to open channel on {}", self.host))?;
        channel
            .exec(&cmd)
            .with_context(|| format!("Failed to run `{}` on {}", cmd, self.host))?;

        if let Some(password) = &self.password {
            if cmd.contains("sudo -S") {
                channel
                    .write_all(format!("{}\n", password).as_bytes())
                    .with_context(|| format!("Failed to feed sudo password on {}", self.host))?;
            }
        }

        let mut stdout = String::new();
        channel
            .read_to_string(&mut stdout)
            .with_context(|| format!("Failed to read output of `{}` on {}", cmd, self.host))?;
        let mut stderr = String::new();
        channel
            .stderr()
            .read_to_string(&mut stderr)
            .with_context(|| format!("Failed to read stderr of `{}` on {}", cmd, self.host))?;
        channel
            .wait_close()
            .with_context(|| format!("Failed to close channel on {}", self.host))?;

        let status = channel
            .exit_status()
            .with_context(|| format!("Failed to read exit status of `{}` on {}", cmd, self.host))?;
        if status != 0 {
            return Err(anyhow::anyhow!(
                "`{}` on {} exited with status {}\nStdout: {}\nStderr: {}",
                cmd,
                self.host,
                status,
                stdout,
                stderr
            ));
        }
        Ok(stdout)
    }

    fn put(&self, local: &str, remote: &str, sudo: bool) -> Result<()> {
        let local_path = expand_home(local);
        let data = std::fs::read(&local_path)
            .with_context(|| format!("Failed to read local file {}", local_path.display()))?;
        let sftp = self
            .session
            .sftp()
            .with_context(|| format!("Failed to open SFTP session on {}", self.host))?;

        if sudo {
            let staging = format!("/tmp/opstool-put-{}", chrono::Utc::now().timestamp_millis());
            let mut file = sftp
                .create(Path::new(&staging))
                .with_context(|| format!("Failed to create {} on {}", staging, self.host))?;
            file.write_all(&data)
                .with_context(|| format!("Failed to write {} on {}", staging, self.host))?;
            drop(file);
            drop(sftp);
            self.exec_checked(&format!("sudo mv {} {}", staging, remote))?;
        } else {
            let mut file = sftp
                .create(Path::new(remote))
                .with_context(|| format!("Failed to create {} on {}", remote, self.host))?;
            file.write_all(&data)
                .with_context(|| format!("Failed to write {} on {}", remote, self.host))?;
        }

        println!("✓ Put {} to {}:{}", local, self.host, remote);
        Ok(())
    }
}
