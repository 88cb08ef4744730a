//! The fixed set of target ABIs a campaign can run against.
//!
//! Each ABI carries a short architecture name (used for paths and log
//! lines), the platform ABI label reported by devices, the toolchain triple
//! handed to test plans, and a minimum supported platform version floor.
//! The set is closed: every orchestration run iterates [`Abi::ALL`] exactly
//! once, and an ABI with no capable device yields a warning rather than a
//! silent omission.

use std::fmt;

/// A target instruction-set/ABI identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Abi {
    /// 32-bit ARM (`armeabi-v7a`).
    Armv7,
    /// 64-bit ARM (`arm64-v8a`).
    Arm64,
    /// 32-bit x86.
    X86,
    /// 64-bit x86.
    X86_64,
}

impl Abi {
    /// Every supported ABI, in the order campaigns are launched.
    pub const ALL: [Abi; 4] = [Abi::Armv7, Abi::Arm64, Abi::X86, Abi::X86_64];

    /// Short architecture name, used in device paths and report lines.
    pub fn arch_name(self) -> &'static str {
        match self {
            Abi::Armv7 => "arm",
            Abi::Arm64 => "arm64",
            Abi::X86 => "x86",
            Abi::X86_64 => "x86_64",
        }
    }

    /// The ABI label as reported by device properties.
    pub fn abi_name(self) -> &'static str {
        match self {
            Abi::Armv7 => "armeabi-v7a",
            Abi::Arm64 => "arm64-v8a",
            Abi::X86 => "x86",
            Abi::X86_64 => "x86_64",
        }
    }

    /// Toolchain triple for this ABI, exposed to test plans.
    pub fn triple(self) -> &'static str {
        match self {
            Abi::Armv7 => "arm-linux-androideabi",
            Abi::Arm64 => "aarch64-linux-android",
            Abi::X86 => "i686-linux-android",
            Abi::X86_64 => "x86_64-linux-android",
        }
    }

    /// The oldest platform version this ABI is supported on.
    pub fn min_supported_version(self) -> u32 {
        match self {
            Abi::Armv7 | Abi::Arm64 | Abi::X86 | Abi::X86_64 => 21,
        }
    }

    /// Raises `requested` to this ABI's floor when the request is older
    /// than what the ABI supports.
    pub fn effective_min_version(self, requested: u32) -> u32 {
        requested.max(self.min_supported_version())
    }

    /// Maps a device-reported ABI label back to an [`Abi`].
    ///
    /// Unknown labels yield `None`; capability discovery ignores them.
    pub fn from_abi_name(name: &str) -> Option<Abi> {
        Abi::ALL.into_iter().find(|abi| abi.abi_name() == name)
    }
}

impl fmt::Display for Abi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.arch_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_min_version_honors_the_floor() {
        assert_eq!(Abi::Arm64.effective_min_version(19), 21);
        assert_eq!(Abi::Arm64.effective_min_version(21), 21);
        assert_eq!(Abi::Arm64.effective_min_version(25), 25);
    }

    #[test]
    fn from_abi_name_maps_known_labels() {
        assert_eq!(Abi::from_abi_name("armeabi-v7a"), Some(Abi::Armv7));
        assert_eq!(Abi::from_abi_name("arm64-v8a"), Some(Abi::Arm64));
        assert_eq!(Abi::from_abi_name("x86"), Some(Abi::X86));
        assert_eq!(Abi::from_abi_name("x86_64"), Some(Abi::X86_64));
        assert_eq!(Abi::from_abi_name("mips"), None);
        assert_eq!(Abi::from_abi_name(""), None);
    }

    #[test]
    fn display_uses_arch_name() {
        assert_eq!(Abi::Armv7.to_string(), "arm");
        assert_eq!(Abi::X86_64.to_string(), "x86_64");
    }

    #[test]
    fn all_covers_every_abi_once() {
        assert_eq!(Abi::ALL.len(), 4);
        for abi in Abi::ALL {
            assert_eq!(Abi::ALL.iter().filter(|a| **a == abi).count(), 1);
        }
    }
}
