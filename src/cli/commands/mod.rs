pub mod install;

pub(crate) use install::cmd_install;
