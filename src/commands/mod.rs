pub mod check;
pub mod completions;
pub mod doctor;
pub mod hook;
pub mod notify;
pub mod present;
pub mod resolve;
pub mod run;
