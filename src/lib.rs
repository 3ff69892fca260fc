#![allow(dead_code)]
#![allow(unused_variables)]
#![allow(unused_imports)]
#![allow(unused_mut)]
#![allow(unused_assignments)]
#![allow(unused_must_use)]

pub mod app_config;
pub mod error;
pub mod job;
pub mod time_util;
pub mod vol;
