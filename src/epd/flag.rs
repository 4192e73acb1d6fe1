/// Data bytes sent along with the configuration commands.
pub struct Flag;

impl Flag {
    // Panel Setting (0x00)
    /// LUT from OTP, black/white/red mode, scan up, shift right, booster on
    pub const PANEL_SETTING_LUT: u8 = 0x0F;
    /// Source and gate timing
    pub const PANEL_SETTING_TIMING: u8 = 0x89;

    // VCOM and Data Interval Setting (0x50)
    /// White border, default data interval
    pub const VCOM_WB_MODE: u8 = 0x77;

    /// Frame byte with every pixel light
    pub const BLANK: u8 = 0xFF;
}
