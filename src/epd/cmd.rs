/// Command bytes understood by the panel controller.
pub struct Cmd;

impl Cmd {
    // Init
    pub const PANEL_SETTING: u8 = 0x00;
    pub const POWER_ON: u8 = 0x04;
    pub const RESOLUTION_SETTING: u8 = 0x61;
    pub const VCOM_AND_DATA_INTERVAL: u8 = 0x50;

    // Update
    pub const DATA_START_TRANSMISSION_1: u8 = 0x10;
    pub const DISPLAY_REFRESH: u8 = 0x12;
    pub const DATA_START_TRANSMISSION_2: u8 = 0x13;

    // Status
    pub const GET_STATUS: u8 = 0x71;
}

/*
Waveshare reference code for this panel:
0x04 - Power On
0x00 - Panel Setting (LUT from OTP, KW-R mode, scan up, shift right, booster on)
0x61 - Resolution Setting
0x50 - VCOM and Data Interval Setting
0x10 - Data Start Transmission 1 (black/white)
0x13 - Data Start Transmission 2 (red)
0x12 - Display Refresh
0x71 - Get Status (refreshes the BUSY line)
*/
