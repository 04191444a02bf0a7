//! Property-Based Tests for mptcp-installer
//!
//! These tests verify:
//! - Classification is a pure function of the filename
//! - Debug kernel images are always skipped
//! - Known prefixes never produce UnknownFile, unknown ones always do
//! - GRUB defaults rewriting always yields an active saved default

use proptest::prelude::*;
use strum::IntoEnumIterator;

use mptcp_installer::bootloader::{find_boot_entry, force_saved_default};
use mptcp_installer::{ArtifactClass, Classification, InstallerError, ReleaseVersion, classify};

/// Strategy for generating ArtifactClass variants
fn class_strategy() -> impl Strategy<Value = ArtifactClass> {
    prop::sample::select(ArtifactClass::iter().collect::<Vec<_>>())
}

/// Strategy for kernel versions like `5.4.230`
fn kernel_version_strategy() -> impl Strategy<Value = String> {
    (1u32..10, 0u32..20, 0u32..400).prop_map(|(a, b, c)| format!("{a}.{b}.{c}"))
}

fn build_strategy() -> impl Strategy<Value = String> {
    "[0-9]{8,14}-[0-9]"
}

// =============================================================================
// Classification
// =============================================================================

proptest! {
    /// classify: same input, same output
    #[test]
    fn classify_is_deterministic(filename in "[a-z0-9._-]{0,60}") {
        let first = classify(&filename).map_err(|e| e.to_string());
        let second = classify(&filename).map_err(|e| e.to_string());
        prop_assert_eq!(first, second);
    }

    /// Kernel images report the version embedded in the filename
    #[test]
    fn kernel_image_version_is_extracted(
        kernel in kernel_version_strategy(),
        build in build_strategy(),
    ) {
        let filename = format!("linux-image-{kernel}.mptcp_{build}_amd64.deb");
        let Classification::Artifact(artifact) = classify(&filename).unwrap() else {
            return Err(TestCaseError::fail("kernel image was skipped"));
        };
        prop_assert_eq!(artifact.class, ArtifactClass::KernelImage);
        prop_assert_eq!(artifact.kernel_version, Some(kernel));
    }

    /// Debug kernel images are always skipped
    #[test]
    fn debug_images_are_skipped(
        kernel in kernel_version_strategy(),
        build in build_strategy(),
    ) {
        let filename = format!("linux-image-{kernel}.mptcp-dbg_{build}_amd64.deb");
        prop_assert_eq!(classify(&filename).unwrap(), Classification::Skip);
    }

    /// Non-image classes accept any suffix and carry no kernel version
    #[test]
    fn known_prefixes_are_classified(
        class in class_strategy(),
        suffix in "[a-z0-9._-]{0,40}",
    ) {
        prop_assume!(class != ArtifactClass::KernelImage);
        let filename = format!("{}{suffix}", class.prefix());
        let Classification::Artifact(artifact) = classify(&filename).unwrap() else {
            return Err(TestCaseError::fail("only kernel images may be skipped"));
        };
        prop_assert_eq!(artifact.class, class);
        prop_assert_eq!(artifact.kernel_version, None);
    }

    /// A kernel image prefix never yields UnknownFile, whatever follows
    #[test]
    fn kernel_image_prefix_is_never_unknown(suffix in "[a-z0-9._-]{0,40}") {
        let filename = format!("linux-image{suffix}");
        let result = classify(&filename);
        let is_unknown = matches!(result, Err(InstallerError::UnknownFile { .. }));
        prop_assert!(!is_unknown);
    }

    /// Anything outside the known prefixes is rejected by name
    #[test]
    fn unknown_prefixes_are_rejected(filename in "[a-z]{1,12}-[a-z0-9._-]{0,30}") {
        prop_assume!(ArtifactClass::iter().all(|c| !filename.starts_with(c.prefix())));
        match classify(&filename) {
            Err(InstallerError::UnknownFile { filename: reported }) => {
                prop_assert_eq!(reported, filename);
            }
            other => return Err(TestCaseError::fail(format!("unexpected {other:?}"))),
        }
    }
}

// =============================================================================
// Release versions
// =============================================================================

proptest! {
    /// Tags with two or three numeric parts parse
    #[test]
    fn release_tags_parse(a in 0u32..100, b in 0u32..100, c in proptest::option::of(0u32..100)) {
        let tag = match c {
            Some(c) => format!("v{a}.{b}.{c}"),
            None => format!("v{a}.{b}"),
        };
        let version: ReleaseVersion = tag.parse().unwrap();
        prop_assert_eq!(version.as_str(), tag.as_str());
    }

    /// Tags without the leading `v` are rejected
    #[test]
    fn bare_numbers_are_not_release_tags(a in 0u32..100, b in 0u32..100) {
        let bare = format!("{a}.{b}");
        prop_assert!(bare.parse::<ReleaseVersion>().is_err());
    }
}

// =============================================================================
// Bootloader
// =============================================================================

proptest! {
    /// Forcing the saved default twice changes nothing the second time
    #[test]
    fn force_saved_default_is_idempotent(contents in "[A-Za-z0-9_=\" \n]{0,120}") {
        let once = force_saved_default(&contents);
        let twice = force_saved_default(&once);
        prop_assert_eq!(&once, &twice);
        let forced = once.lines().any(|line| {
            line.trim_start()
                .strip_prefix("GRUB_DEFAULT")
                .is_some_and(|rest| rest.trim_start() == "=saved")
        });
        prop_assert!(forced, "no active GRUB_DEFAULT=saved in {:?}", once);
    }

    /// Any assigned value, named or numeric, ends up as `saved`; commented
    /// assignments stay and an active one is added
    #[test]
    fn any_default_value_is_forced_to_saved(
        commented in any::<bool>(),
        value in "[A-Za-z0-9 ,.>\"'()_-]{0,60}",
    ) {
        let line = format!("{}GRUB_DEFAULT={value}", if commented { "#" } else { "" });
        let contents = format!("{line}\nGRUB_TIMEOUT=5\n");
        let forced = force_saved_default(&contents);
        prop_assert!(forced.lines().any(|l| l == "GRUB_DEFAULT=saved"), "{:?}", forced);
        if commented {
            prop_assert!(forced.lines().any(|l| l == line), "{:?}", forced);
        }
    }

    /// A menu without the kernel never yields an entry
    #[test]
    fn absent_kernel_is_never_found(
        present in kernel_version_strategy(),
        wanted in kernel_version_strategy(),
    ) {
        prop_assume!(present != wanted);
        let menu = format!(
            "menuentry 'Linux {present}.mptcp' $menuentry_id_option \
             'gnulinux-{present}.mptcp-advanced-x' {{\n}}\n"
        );
        prop_assert!(find_boot_entry(&menu, &present).is_some());
        prop_assert!(find_boot_entry(&menu, &wanted).is_none());
    }
}
