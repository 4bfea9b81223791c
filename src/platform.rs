//! Target operating system and CPU architecture selection.
//!
//! Resolution order is the same for both axes: an explicit override wins,
//! otherwise the running host is inspected.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    Windows,
    Linux,
}

impl Os {
    /// The host operating system. Anything that is not Windows is treated as Linux.
    pub fn host() -> Self {
        if cfg!(target_os = "windows") {
            Os::Windows
        } else {
            Os::Linux
        }
    }

    /// Parse an `--os` override. Empty means "use the host".
    pub fn from_override(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => Self::host(),
            Some(token) => {
                let token = token.to_ascii_lowercase();
                if token == "win" || token == "windows" {
                    Os::Windows
                } else {
                    Os::Linux
                }
            }
        }
    }

    /// Token used in archive names and cache folder names.
    pub fn as_str(&self) -> &'static str {
        match self {
            Os::Windows => "windows",
            Os::Linux => "linux",
        }
    }

    /// Extension of native shared libraries on this OS.
    pub fn lib_extension(&self) -> &'static str {
        match self {
            Os::Windows => ".dll",
            Os::Linux => ".so",
        }
    }

    pub fn is_windows(&self) -> bool {
        matches!(self, Os::Windows)
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X86,
    X64,
}

impl Arch {
    pub fn host() -> Self {
        match std::env::consts::ARCH {
            "x86" | "arm" => Arch::X86,
            _ => Arch::X64,
        }
    }

    /// Parse a `--cpu` override. Empty or any token containing `any` means
    /// "match the host"; `x64` selects 64-bit and everything else 32-bit.
    pub fn from_override(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => Self::host(),
            Some(token) => {
                let token = token.to_ascii_lowercase();
                if token.contains("any") {
                    Self::host()
                } else if token == "x64" {
                    Arch::X64
                } else {
                    Arch::X86
                }
            }
        }
    }

    pub fn bits(&self) -> u8 {
        match self {
            Arch::X86 => 32,
            Arch::X64 => 64,
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arch::X86 => write!(f, "x86"),
            Arch::X64 => write!(f, "x64"),
        }
    }
}

/// Resolve a concrete `(os, arch)` pair from optional overrides.
pub fn select(os: Option<&str>, cpu: Option<&str>) -> (Os, Arch) {
    (Os::from_override(os), Arch::from_override(cpu))
}
