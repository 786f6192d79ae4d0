use lazy_static::lazy_static;

lazy_static! {
    /// Firehose XML markers, checked in order. The first marker found in the
    /// document decides the label.
    static ref FIREHOSE_XML_MARKERS: Vec<(&'static str, &'static str)> = vec![
        ("<configure", "Firehose_Config"),
        ("<read", "Firehose_ReadCmd"),
        ("<program", "Firehose_WriteCmd"),
        ("<erase", "Firehose_EraseCmd"),
        ("<getstorageinfo", "Firehose_StorageInfoCmd"),
        ("ACK", "Firehose_Ack"),
        ("NAK", "Firehose_Nak"),
    ];
}

/// Block sizes that raw Firehose data transfers are sent in.
pub const FIREHOSE_BLOCK_SIZES: [usize; 3] = [512, 1024, 4096];

pub fn get_firehose_xml_label(document: &str) -> Option<&'static str> {
    FIREHOSE_XML_MARKERS
        .iter()
        .find(|(marker, _)| document.contains(marker))
        .map(|(_, label)| *label)
}
