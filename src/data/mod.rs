pub mod firehose_tags;
pub mod sahara_commands;
