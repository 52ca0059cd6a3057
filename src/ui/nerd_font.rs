/// Curated NerdFont icons used by diskclone output.
///
/// Only the glyphs the clone workflow and the updater actually print are kept
/// here so that the set stays consistent in style across terminals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NerdFont {
    // Status and feedback
    Check,          //
    CrossCircle,    //
    Warning,        //
    Info,           //

    // Files and folders
    Folder,         //
    Download,       //
    Archive,        //

    // System and hardware
    Gear,           //
    Lock,           //
    HardDrive,      //
    Partition,      //

    // Actions and progress
    Search,         //
    List,           //
    Rocket,         //
    Upgrade,        //
    Trash,          //
}

impl NerdFont {
    /// Get the Unicode character for this nerd font icon
    pub const fn unicode(&self) -> char {
        match self {
            Self::Check => '\u{f00c}',          // fa-check
            Self::CrossCircle => '\u{f057}',    // fa-times-circle
            Self::Warning => '\u{f071}',        // fa-exclamation-triangle
            Self::Info => '\u{f05a}',           // fa-info-circle

            Self::Folder => '\u{f07b}',         // fa-folder
            Self::Download => '\u{f019}',       // fa-download
            Self::Archive => '\u{f187}',        // fa-archive

            Self::Gear => '\u{f013}',           // fa-gear
            Self::Lock => '\u{f023}',           // fa-lock
            Self::HardDrive => '\u{f0a0}',      // fa-hdd
            Self::Partition => '\u{f1c0}',      // fa-database (reused but semantic)

            Self::Search => '\u{f002}',         // fa-search
            Self::List => '\u{f03a}',           // fa-list
            Self::Rocket => '\u{f135}',         // fa-rocket
            Self::Upgrade => '\u{f0aa}',        // fa-arrow-circle-up
            Self::Trash => '\u{f1f8}',          // fa-trash
        }
    }
}

impl std::fmt::Display for NerdFont {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.unicode())
    }
}

impl From<NerdFont> for char {
    fn from(icon: NerdFont) -> Self {
        icon.unicode()
    }
}
