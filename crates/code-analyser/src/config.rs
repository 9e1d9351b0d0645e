//! Tunables the original left as file-scope constants.

/// Knobs for [`crate::analyser::CodeAnalyser`].
///
/// Grounded on `emu-spectrum/src/config.rs`'s plain struct-of-fields
/// style: no builder, no defaults trait magic, just a struct you
/// construct with named fields or [`AnalyserConfig::default`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyserConfig {
    /// Whether `insert_rom_labels`/`insert_system_labels` run during
    /// `CodeAnalyser::new`. Platforms that want to seed labels lazily
    /// (after their ROM image is loaded) can set this to `false`.
    pub insert_initial_labels: bool,

    /// Lower bound (inclusive) of the byte value range `SetItemText`
    /// treats as plausible ASCII text (`0x01..0x7F`).
    pub text_detect_low: u8,
    /// Upper bound (exclusive) of the same range.
    pub text_detect_high: u8,

    /// Address range considered when building the global data-item list
    /// (mirrors `FLabelListFilter::MinAddress/MaxAddress`). `None` means
    /// unrestricted.
    pub global_data_min_address: Option<u16>,
    pub global_data_max_address: Option<u16>,

    /// Maximum number of commands retained on the undo stack.
    pub undo_stack_capacity: usize,
}

impl Default for AnalyserConfig {
    fn default() -> Self {
        Self {
            insert_initial_labels: true,
            text_detect_low: 0x01,
            text_detect_high: 0x7F,
            global_data_min_address: None,
            global_data_max_address: None,
            undo_stack_capacity: 512,
        }
    }
}
