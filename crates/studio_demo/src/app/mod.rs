mod bootstrap;
mod colony_sim;
mod job_script;
mod runner;
mod subjects;

pub(crate) use runner::run;
