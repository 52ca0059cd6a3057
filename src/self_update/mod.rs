use crate::common::git;
use crate::config::Config;
use crate::ui::prelude::*;
use anyhow::{Context, Result, anyhow};
use colored::Colorize;
use sha2::Digest;
use std::env;
use std::fs;
use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use sudo::RunningAs;

const DEFAULT_REPOSITORY: &str = "diskclone/diskclone";
const BIN_NAME: &str = "diskclone";
const GITHUB_API_URL: &str = "https://api.github.com/repos";
const CHANGELOG_LINES: usize = 15;

/// GitHub repository releases are fetched from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateSource {
    pub owner: String,
    pub repo: String,
}

impl UpdateSource {
    /// Parse `owner/repo`.
    pub fn from_slug(slug: &str) -> Option<Self> {
        let (owner, repo) = slug.trim().trim_matches('/').split_once('/')?;
        let repo = repo.trim_end_matches(".git");
        if owner.is_empty() || repo.is_empty() || repo.contains('/') {
            return None;
        }
        Some(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
        })
    }

    /// Parse a GitHub remote URL in https or ssh form. Other hosts yield `None`.
    pub fn from_remote_url(url: &str) -> Option<Self> {
        let url = url.trim();
        let path = url
            .strip_prefix("https://github.com/")
            .or_else(|| url.strip_prefix("http://github.com/"))
            .or_else(|| url.strip_prefix("ssh://git@github.com/"))
            .or_else(|| url.strip_prefix("git@github.com:"))?;
        Self::from_slug(path)
    }

    /// The checkout's `origin` remote if it points at GitHub, then the
    /// configured repository, then the default one.
    pub fn resolve(config: &Config) -> Self {
        let from_checkout = env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .and_then(|dir| git::origin_url(&dir))
            .and_then(|url| Self::from_remote_url(&url));

        from_checkout
            .or_else(|| {
                config
                    .update_repository
                    .as_deref()
                    .and_then(Self::from_slug)
            })
            .or_else(|| Self::from_slug(DEFAULT_REPOSITORY))
            .unwrap_or_else(|| Self {
                owner: "diskclone".into(),
                repo: "diskclone".into(),
            })
    }

    fn latest_release_url(&self) -> String {
        format!(
            "{}/{}/{}/releases/latest",
            GITHUB_API_URL, self.owner, self.repo
        )
    }
}

impl std::fmt::Display for UpdateSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.repo)
    }
}

#[derive(Debug, Clone)]
struct InstallLocation {
    path: PathBuf,
    needs_sudo: bool,
    is_managed: bool,
}

/// Check if the binary is installed in a package manager location
fn is_package_managed_location(path: &Path) -> bool {
    if path.starts_with("/usr/bin") || path.starts_with("/usr/sbin") {
        return true;
    }

    if let Some(home) = dirs::home_dir() {
        let cargo_bin = home.join(".cargo").join("bin");
        if path.starts_with(cargo_bin) {
            return true;
        }
    }

    false
}

/// Check if a directory is writable
fn is_writable(path: &Path) -> bool {
    if !path.exists() {
        return path.parent().is_some_and(is_writable);
    }

    fs::metadata(path)
        .map(|m| m.permissions().mode() & 0o200 != 0)
        .unwrap_or(false)
        && nix::unistd::access(path, nix::unistd::AccessFlags::W_OK).is_ok()
}

fn get_install_location() -> Result<InstallLocation> {
    let current_exe = env::current_exe().context("Failed to get current executable path")?;
    let is_managed = is_package_managed_location(&current_exe);
    let parent = current_exe
        .parent()
        .ok_or_else(|| anyhow!("Could not determine parent directory of executable"))?;

    Ok(InstallLocation {
        needs_sudo: !is_writable(parent),
        path: current_exe,
        is_managed,
    })
}

fn detect_target() -> Result<String> {
    match env::consts::ARCH {
        "x86_64" => Ok("x86_64-unknown-linux-gnu".to_string()),
        "aarch64" => Ok("aarch64-unknown-linux-gnu".to_string()),
        arch => Err(anyhow!("Unsupported architecture: {}", arch)),
    }
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct GitHubAsset {
    name: String,
    browser_download_url: String,
}

#[derive(serde::Deserialize, Debug, Clone)]
pub struct GitHubRelease {
    tag_name: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    assets: Vec<GitHubAsset>,
}

impl GitHubRelease {
    pub fn version(&self) -> &str {
        self.tag_name.trim_start_matches('v')
    }
}

#[derive(Debug, Clone)]
pub enum UpdateStatus {
    UpToDate {
        version: String,
    },
    UpdateAvailable {
        version: String,
        changelog: String,
        release: GitHubRelease,
    },
    CheckFailed {
        reason: String,
    },
}

fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(format!("{}/{}", BIN_NAME, env!("CARGO_PKG_VERSION")))
        .build()
        .context("Failed to create HTTP client")
}

async fn fetch_latest_release(source: &UpdateSource) -> Result<GitHubRelease> {
    let response = http_client()?
        .get(source.latest_release_url())
        .header("Accept", "application/vnd.github+json")
        .send()
        .await
        .context("Failed to fetch release information")?;

    if !response.status().is_success() {
        return Err(anyhow!("GitHub API returned status: {}", response.status()));
    }

    response
        .json::<GitHubRelease>()
        .await
        .context("Failed to parse release information")
}

/// Compare version strings
fn is_newer_version(current: &str, latest: &str) -> bool {
    let parse_version = |v: &str| {
        v.trim_start_matches('v')
            .split('.')
            .filter_map(|s| s.parse::<u32>().ok())
            .collect::<Vec<_>>()
    };

    let current_parts = parse_version(current);
    let latest_parts = parse_version(latest);

    for (c, l) in current_parts.iter().zip(latest_parts.iter()) {
        if l > c {
            return true;
        } else if l < c {
            return false;
        }
    }

    latest_parts.len() > current_parts.len()
}

/// First lines of the release notes.
fn changelog_excerpt(body: Option<&str>) -> String {
    let Some(body) = body.map(str::trim).filter(|b| !b.is_empty()) else {
        return "(no release notes)".to_string();
    };
    let lines: Vec<&str> = body.lines().collect();
    let mut excerpt = lines
        .iter()
        .take(CHANGELOG_LINES)
        .copied()
        .collect::<Vec<_>>()
        .join("\n");
    if lines.len() > CHANGELOG_LINES {
        excerpt.push_str("\n...");
    }
    excerpt
}

/// Ask GitHub whether a newer release exists. Never fails; problems become `CheckFailed`.
pub async fn check_for_update(source: &UpdateSource) -> UpdateStatus {
    let current = env!("CARGO_PKG_VERSION");
    match fetch_latest_release(source).await {
        Ok(release) => classify_release(current, release),
        Err(err) => UpdateStatus::CheckFailed {
            reason: format!("{err:#}"),
        },
    }
}

fn classify_release(current: &str, release: GitHubRelease) -> UpdateStatus {
    if is_newer_version(current, release.version()) {
        UpdateStatus::UpdateAvailable {
            version: release.version().to_string(),
            changelog: changelog_excerpt(release.body.as_deref()),
            release,
        }
    } else {
        UpdateStatus::UpToDate {
            version: current.to_string(),
        }
    }
}

/// Archive for `target` and its mandatory checksum file.
fn find_asset_url(release: &GitHubRelease, target: &str) -> Result<(String, String)> {
    let archive_asset = release
        .assets
        .iter()
        .find(|a| {
            a.name.contains(target)
                && (a.name.ends_with(".tar.zst")
                    || a.name.ends_with(".tgz")
                    || a.name.ends_with(".tar.gz"))
        })
        .ok_or_else(|| anyhow!("No prebuilt archive found for {}", target))?;

    let sha_asset = release
        .assets
        .iter()
        .find(|a| a.name == format!("{}.sha256", archive_asset.name))
        .ok_or_else(|| {
            anyhow!(
                "Release has no checksum for {}; refusing to install an unverified binary",
                archive_asset.name
            )
        })?;

    Ok((
        archive_asset.browser_download_url.clone(),
        sha_asset.browser_download_url.clone(),
    ))
}

async fn download_file(url: &str, dest: &Path) -> Result<()> {
    let response = http_client()?
        .get(url)
        .send()
        .await
        .context("Failed to download file")?;

    if !response.status().is_success() {
        return Err(anyhow!(
            "Download failed with status: {}",
            response.status()
        ));
    }

    let bytes = response.bytes().await.context("Failed to read response")?;
    fs::write(dest, bytes).context("Failed to write file")?;
    Ok(())
}

/// Compare a file's SHA-256 with the first field of a `sha256sum` style line.
fn verify_checksum(archive_path: &Path, checksum_content: &str) -> Result<()> {
    let expected_hash = checksum_content
        .split_whitespace()
        .next()
        .ok_or_else(|| anyhow!("Invalid checksum file format"))?;

    let archive_bytes =
        fs::read(archive_path).context("Failed to read archive for verification")?;
    let actual_hash = format!("{:x}", sha2::Sha256::digest(archive_bytes));

    if !actual_hash.eq_ignore_ascii_case(expected_hash) {
        return Err(anyhow!(
            "Checksum verification failed (expected {}, got {})",
            expected_hash,
            actual_hash
        ));
    }
    Ok(())
}

fn extract_archive(archive_path: &Path, dest_dir: &Path) -> Result<()> {
    let filename = archive_path.to_string_lossy();
    let flags = if filename.ends_with(".tar.zst") {
        vec!["--zstd", "-xf"]
    } else if filename.ends_with(".tgz") || filename.ends_with(".tar.gz") {
        vec!["-xzf"]
    } else {
        return Err(anyhow!("Unsupported archive format"));
    };

    let mut args: Vec<String> = flags.into_iter().map(String::from).collect();
    args.push(archive_path.to_string_lossy().into_owned());
    args.push("-C".into());
    args.push(dest_dir.to_string_lossy().into_owned());

    let output = duct::cmd("tar", &args)
        .stdout_capture()
        .stderr_capture()
        .unchecked()
        .run()
        .context("Failed to run tar")?;

    if !output.status.success() {
        return Err(anyhow!(
            "tar extraction failed: {}",
            String::from_utf8_lossy(&output.stderr)
        ));
    }
    Ok(())
}

fn find_binary_in_dir(search_dir: &Path, bin_name: &str) -> Result<PathBuf> {
    for entry in walkdir::WalkDir::new(search_dir) {
        let entry = entry?;
        if entry.file_type().is_file() && entry.file_name() == bin_name {
            return Ok(entry.path().to_path_buf());
        }
    }
    Err(anyhow!(
        "Binary {} not found in extracted archive",
        bin_name
    ))
}

/// Replace `target_path` with `binary_path` by staging next to it and renaming.
///
/// The rename is atomic, so the old binary stays intact if anything fails first.
fn install_binary(binary_path: &Path, target_path: &Path, needs_sudo: bool) -> Result<()> {
    let dir = target_path
        .parent()
        .ok_or_else(|| anyhow!("Install target has no parent directory"))?;

    if needs_sudo {
        emit(
            Level::Info,
            "self_update.install.sudo",
            &format!(
                "{} Requesting elevated permissions to install...",
                char::from(NerdFont::Lock)
            ),
            None,
        );

        let staged = dir.join(format!(".{}.new", BIN_NAME));
        duct::cmd!("sudo", "install", "-m", "755", binary_path, &staged)
            .run()
            .context("sudo install failed")?;
        if let Err(err) = duct::cmd!("sudo", "mv", "-f", &staged, target_path).run() {
            let _ = duct::cmd!("sudo", "rm", "-f", &staged).run();
            return Err(err).context("Failed to move the new binary into place");
        }
        return Ok(());
    }

    let bytes = fs::read(binary_path).context("Failed to read new binary")?;
    let mut staged =
        tempfile::NamedTempFile::new_in(dir).context("Failed to stage new binary")?;
    staged.write_all(&bytes).context("Failed to write new binary")?;
    staged
        .as_file()
        .set_permissions(fs::Permissions::from_mode(0o755))
        .context("Failed to set binary permissions")?;
    staged
        .persist(target_path)
        .map_err(|e| e.error)
        .context("Failed to move the new binary into place")?;
    Ok(())
}

/// Restart into the freshly installed binary with the same arguments.
fn reexec(path: &Path) -> Result<()> {
    use std::os::unix::process::CommandExt;

    crate::ui::detach_run_log();
    let err = std::process::Command::new(path)
        .args(env::args_os().skip(1))
        .exec();
    Err(anyhow!("Failed to restart {}: {}", path.display(), err))
}

/// Download, verify and install `release`, then restart.
pub async fn apply_update(release: &GitHubRelease) -> Result<()> {
    let location = get_install_location()?;

    if location.is_managed {
        emit(
            Level::Warn,
            "self_update.package_managed",
            &format!(
                "{} This installation appears to be managed by a package manager.",
                char::from(NerdFont::Warning)
            ),
            None,
        );
        println!("   Please use your package manager to update instead.");
        if location.path.to_string_lossy().contains(".cargo/bin") {
            println!("   {}: cargo install {}", "Example".bright_black(), BIN_NAME);
        }
        return Ok(());
    }

    let target = detect_target()?;
    let (archive_url, sha_url) = find_asset_url(release, &target)?;

    let temp_dir = tempfile::tempdir().context("Failed to create temporary directory")?;
    let archive_name = archive_url.split('/').next_back().unwrap_or("archive");
    let archive_path = temp_dir.path().join(archive_name);
    let checksum_path = temp_dir.path().join(format!("{archive_name}.sha256"));

    emit(
        Level::Info,
        "self_update.downloading",
        &format!("{} Downloading update...", char::from(NerdFont::Download)),
        None,
    );
    download_file(&archive_url, &archive_path).await?;
    download_file(&sha_url, &checksum_path).await?;

    let checksum = fs::read_to_string(&checksum_path).context("Failed to read checksum file")?;
    verify_checksum(&archive_path, &checksum)?;
    emit(
        Level::Success,
        "self_update.checksum.verified",
        &format!("{} Checksum verified", char::from(NerdFont::Check)),
        None,
    );

    emit(
        Level::Info,
        "self_update.extracting",
        &format!("{} Extracting archive...", char::from(NerdFont::Archive)),
        None,
    );
    let extract_dir = temp_dir.path().join("extracted");
    fs::create_dir(&extract_dir)?;
    extract_archive(&archive_path, &extract_dir)?;
    let new_binary = find_binary_in_dir(&extract_dir, BIN_NAME)?;

    emit(
        Level::Info,
        "self_update.installing",
        &format!("{} Installing update...", char::from(NerdFont::Gear)),
        None,
    );
    let needs_sudo = location.needs_sudo && matches!(sudo::check(), RunningAs::User);
    install_binary(&new_binary, &location.path, needs_sudo)?;

    emit(
        Level::Success,
        "self_update.complete",
        &format!(
            "{} Updated to {}; restarting...",
            char::from(NerdFont::Check),
            release.version()
        ),
        None,
    );
    reexec(&location.path)
}

/// Check for a newer release and, if the operator agrees, install it.
pub async fn self_update(config: &Config) -> Result<()> {
    let source = UpdateSource::resolve(config);
    emit(
        Level::Info,
        "self_update.checking",
        &format!(
            "{} Checking {} for updates...",
            char::from(NerdFont::Search),
            source
        ),
        None,
    );

    match check_for_update(&source).await {
        UpdateStatus::UpToDate { version } => {
            emit(
                Level::Success,
                "self_update.up_to_date",
                &format!(
                    "{} Already up to date ({})",
                    char::from(NerdFont::Check),
                    version
                ),
                None,
            );
            Ok(())
        }
        UpdateStatus::CheckFailed { reason } => {
            emit(
                Level::Warn,
                "self_update.check_failed",
                &format!(
                    "{} Could not check for updates: {}",
                    char::from(NerdFont::Warning),
                    reason
                ),
                None,
            );
            Ok(())
        }
        UpdateStatus::UpdateAvailable {
            version,
            changelog,
            release,
        } => {
            emit(
                Level::Success,
                "self_update.available",
                &format!(
                    "{} Update available: {} → {}",
                    char::from(NerdFont::Upgrade),
                    env!("CARGO_PKG_VERSION"),
                    version
                ),
                Some(serde_json::json!({ "version": version, "changelog": changelog })),
            );
            if get_output_format() == OutputFormat::Text {
                println!("{}", changelog.bright_black());
            }

            use dialoguer::Confirm;
            if !Confirm::new()
                .with_prompt("Do you want to update?")
                .default(false)
                .interact()?
            {
                emit(
                    Level::Info,
                    "self_update.cancelled",
                    &format!("{} Update cancelled", char::from(NerdFont::Info)),
                    None,
                );
                return Ok(());
            }
            apply_update(&release).await
        }
    }
}
