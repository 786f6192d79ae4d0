use lazy_static::lazy_static;
use std::collections::HashMap;

lazy_static! {
    static ref SAHARA_COMMAND_MAP: HashMap<u32, &'static str> = {
        let mut m = HashMap::new();

        // Qualcomm Sahara command codes (first little-endian dword of every packet)
        m.insert(0x01, "Sahara_Hello");
        m.insert(0x02, "Sahara_HelloResponse");
        m.insert(0x03, "Sahara_ReadData");
        m.insert(0x04, "Sahara_ReadDataResponse");
        m.insert(0x05, "Sahara_EndTransfer");
        m.insert(0x06, "Sahara_Done");
        m.insert(0x07, "Sahara_DoneResponse");
        m.insert(0x08, "Sahara_Reset");
        m.insert(0x09, "Sahara_ResetResponse");

        m
    };
}

pub fn get_sahara_command_label(command: u32) -> Option<&'static str> {
    SAHARA_COMMAND_MAP.get(&command).copied()
}

pub fn get_sahara_commands() -> Vec<(u32, String)> {
    let mut commands: Vec<(u32, String)> = SAHARA_COMMAND_MAP
        .iter()
        .map(|(&code, &name)| (code, name.to_string()))
        .collect();
    commands.sort_by_key(|(code, _)| *code);
    commands
}
