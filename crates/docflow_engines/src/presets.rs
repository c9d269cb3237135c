#![forbid(unsafe_code)]

use docflow_kernel_contracts::command::{Purpose, PurposePreset};

pub fn get_purpose_presets(purpose: Purpose) -> PurposePreset {
    purpose.preset()
}

/// Unknown names get the email preset.
pub fn purpose_presets_for_name(name: &str) -> PurposePreset {
    Purpose::parse(name).unwrap_or(Purpose::Email).preset()
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_kernel_contracts::command::Quality;

    #[test]
    fn at_presets_01_table_values() {
        let web = get_purpose_presets(Purpose::Web);
        assert_eq!(web.max_size_mb, 5.0);
        assert_eq!(web.quality, Quality::Low);
        assert_eq!(web.dpi, 72);
        assert_eq!(get_purpose_presets(Purpose::Print).dpi, 300);
        assert_eq!(get_purpose_presets(Purpose::Whatsapp).max_size_mb, 16.0);
    }

    #[test]
    fn at_presets_02_unknown_name_defaults_to_email() {
        assert_eq!(
            purpose_presets_for_name("carrier pigeon"),
            get_purpose_presets(Purpose::Email)
        );
        assert_eq!(
            purpose_presets_for_name("SHARE"),
            get_purpose_presets(Purpose::Share)
        );
    }
}
