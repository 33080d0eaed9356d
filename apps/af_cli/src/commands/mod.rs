// aeroflex\apps\af_cli\src/commands/mod.rs

//! 命令实现模块

pub mod info;
pub mod verify;
