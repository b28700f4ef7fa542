//! Built-in defaults for settings, paths and the Ansible environment.
//!
//! Ansible is configured entirely through environment variables written to the
//! settings file; no `ansible.cfg` is ever created.

pub const ENV_FILE: &str = ".env";

pub const CONTAINER_RUNTIME: &str = "podman";
pub const CONTAINER_NAME: &str = "ansible_target";
pub const CONTAINER_IMAGE: &str = "ansible_target:latest";
pub const CONTAINER_HOST_PORT: u16 = 2222;
/// SSH port inside the container.
pub const CONTAINER_SSH_PORT: u16 = 22;
pub const CONTAINERFILE: &str = "containerfile";

pub const SSH_DIR: &str = "ssh_keys";
pub const KEY_BASENAME: &str = "ansible_target";
pub const AUTHORIZED_KEYS: &str = "authorized_keys";
pub const KEY_COMMENT: &str = "ansible@target";
/// Where the key directory is mounted inside the container.
pub const CONTAINER_SSH_MOUNT: &str = "/root/.ssh";

pub const VAULT_PASSWORD_FILE: &str = "vault-pw.txt";
pub const VAULT_DEMO_PASSWORD: &str = "password";

pub const INVENTORY_FILE: &str = "inventory/main.yml";
pub const PLAYBOOK_FILE: &str = "playbooks/sample_playbook.yml";
pub const REQUIREMENTS_FILE: &str = "requirements.txt";

/// Limit applied when the container is skipped and no limit was given.
pub const LOCAL_LIMIT: &str = "localhost";

pub const SIBLING_ROLE: &str = "ans_dev_sandbox_role";
pub const REQUIRED_COLLECTIONS: [&str; 2] = ["ansible.posix", "community.general"];

/// Settings keys shared by `activate` and `run`.
pub mod keys {
    pub const PLAYBOOK_PATH: &str = "PLAYBOOK_PATH";
    pub const CONTAINER_RUNTIME: &str = "CONTAINER_RUNTIME";
    pub const CONTAINER_NAME: &str = "CONTAINER_NAME";
    pub const CONTAINER_HOST_PORT: &str = "CONTAINER_HOST_PORT";
    pub const VENV_PYTHON: &str = "VENV_PYTHON";
    pub const VAULT_PASSWORD_FILE: &str = "ANSIBLE_VAULT_PASSWORD_FILE";
    pub const PRIVATE_KEY_FILE: &str = "ANSIBLE_PRIVATE_KEY_FILE";
    pub const HOST_KEY_CHECKING: &str = "ANSIBLE_HOST_KEY_CHECKING";
}

/// Ansible tuning written to the settings file during activation.
pub const ANSIBLE_ENV: [(&str, &str); 8] = [
    ("ANSIBLE_DISPLAY_ARGS_TO_STDOUT", "false"),
    ("ANSIBLE_CALLBACKS_ENABLED", "profile_tasks"),
    ("ANSIBLE_LOAD_CALLBACK_PLUGINS", "true"),
    ("ANSIBLE_LOG_PATH", "ansible.log"),
    ("ANSIBLE_ROLES_PATH", "roles"),
    ("ANSIBLE_FILTER_PLUGINS", "plugins"),
    ("ANSIBLE_LIBRARY", "library"),
    ("ANSIBLE_CALLBACK_RESULT_FORMAT", "yaml"),
];
