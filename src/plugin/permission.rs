use crate::error::{HookError, Result};
use crate::plugin::manifest::{DocumentId, ManifestDocument, NodeId};

pub const PLATFORM_TAG: &str = "platform";
pub const CONFIG_FILE_TAG: &str = "config-file";
pub const PERMISSION_TAG: &str = "uses-permission";
pub const PERMISSION_NAME_ATTR: &str = "android:name";

/// The `<config-file>` element a permission was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerRef {
    document: DocumentId,
    node: NodeId,
}

/// One `<uses-permission>` declaration discovered in a plugin manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionEntry {
    pub name: String,
    pub platform: String,
    container: ContainerRef,
}

impl PermissionEntry {
    /// Label shown to the operator, e.g. `android.permission.CAMERA (android)`.
    pub fn label(&self) -> String {
        format!("{} ({})", self.name, self.platform)
    }
}

/// Collect every permission declared under a `<config-file>` targeting one of
/// `targets`, inside any `<platform>` section, in document order.
pub fn scan_permissions(doc: &ManifestDocument, targets: &[String]) -> Vec<PermissionEntry> {
    let mut entries = Vec::new();

    let platforms = doc
        .descendants(doc.root())
        .into_iter()
        .filter(|id| doc.is_element(*id, PLATFORM_TAG));

    for platform in platforms {
        let platform_name = doc.attribute(platform, "name").unwrap_or_default();

        let containers = doc.descendants(platform).into_iter().filter(|id| {
            doc.is_element(*id, CONFIG_FILE_TAG)
                && doc
                    .attribute(*id, "target")
                    .is_some_and(|target| targets.iter().any(|t| t == target))
                && doc
                    .child_elements(*id)
                    .into_iter()
                    .any(|child| doc.is_element(child, PERMISSION_TAG))
        });

        for container in containers {
            for permission in doc.descendants(container) {
                if !doc.is_element(permission, PERMISSION_TAG) {
                    continue;
                }

                let Some(name) = doc.attribute(permission, PERMISSION_NAME_ATTR) else {
                    tracing::warn!(
                        platform = platform_name,
                        "skipping <uses-permission> without {PERMISSION_NAME_ATTR}"
                    );
                    continue;
                };

                entries.push(PermissionEntry {
                    name: name.to_string(),
                    platform: platform_name.to_string(),
                    container: ContainerRef {
                        document: doc.id(),
                        node: container,
                    },
                });
            }
        }
    }

    entries
}

/// Detach one `<uses-permission>` matching `entry` from its container.
/// Direct children are preferred over deeper descendants. Returns false when
/// no matching element is left (e.g. a duplicate was already removed).
pub fn remove_permission(doc: &mut ManifestDocument, entry: &PermissionEntry) -> Result<bool> {
    if entry.container.document != doc.id() {
        return Err(HookError::ForeignEntry(entry.name.clone()));
    }

    let container = entry.container.node;
    let view: &ManifestDocument = doc;
    let matches = |id: &NodeId| {
        view.is_element(*id, PERMISSION_TAG)
            && view.attribute(*id, PERMISSION_NAME_ATTR) == Some(entry.name.as_str())
    };

    let direct = view.child_elements(container).into_iter().find(matches);

    let target = match direct {
        Some(id) => Some((container, id)),
        None => view
            .descendants(container)
            .into_iter()
            .find(matches)
            .and_then(|id| view.parent_of(id).map(|parent| (parent, id))),
    };

    Ok(match target {
        Some((parent, id)) => doc.detach(parent, id),
        None => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets() -> Vec<String> {
        vec!["AndroidManifest.xml".to_string()]
    }

    const MULTI: &str = r#"<plugin id="multi" xmlns:android="http://schemas.android.com/apk/res/android">
    <platform name="android">
        <config-file target="AndroidManifest.xml" parent="/*">
            <uses-permission android:name="android.permission.CAMERA" />
            <uses-permission android:name="android.permission.INTERNET" />
        </config-file>
        <config-file target="res/xml/config.xml" parent="/*">
            <feature name="Camera" />
        </config-file>
        <config-file target="AndroidManifest.xml" parent="application">
            <activity android:name="Foo" />
        </config-file>
        <config-file target="AndroidManifest.xml" parent="/manifest">
            <uses-permission android:name="android.permission.CAMERA" />
            <uses-permission />
        </config-file>
    </platform>
    <platform name="amazon-fireos">
        <config-file target="AndroidManifest.xml" parent="/*">
            <uses-permission android:name="android.permission.ACCESS_FINE_LOCATION" />
        </config-file>
    </platform>
    <platform name="ios">
        <config-file target="*-Info.plist" parent="NSCameraUsageDescription">
            <string>camera</string>
        </config-file>
    </platform>
</plugin>"#;

    fn labels(entries: &[PermissionEntry]) -> Vec<String> {
        entries.iter().map(PermissionEntry::label).collect()
    }

    #[test]
    fn scans_only_android_manifest_permissions() {
        let doc = ManifestDocument::parse(MULTI).unwrap();
        let entries = scan_permissions(&doc, &targets());

        assert_eq!(
            labels(&entries),
            vec![
                "android.permission.CAMERA (android)",
                "android.permission.INTERNET (android)",
                "android.permission.CAMERA (android)",
                "android.permission.ACCESS_FINE_LOCATION (amazon-fireos)",
            ]
        );
        assert_eq!(entries[0].container, entries[1].container);
        assert_ne!(entries[0].container, entries[2].container);
    }

    #[test]
    fn scanning_twice_is_identical() {
        let doc = ManifestDocument::parse(MULTI).unwrap();
        assert_eq!(
            scan_permissions(&doc, &targets()),
            scan_permissions(&doc, &targets())
        );
    }

    #[test]
    fn custom_targets_are_honoured() {
        let doc = ManifestDocument::parse(
            r#"<plugin><platform name="android">
                <config-file target="app/src/main/AndroidManifest.xml" parent="/*">
                    <uses-permission android:name="android.permission.VIBRATE" />
                </config-file>
            </platform></plugin>"#,
        )
        .unwrap();

        assert!(scan_permissions(&doc, &targets()).is_empty());
        let entries = scan_permissions(&doc, &["app/src/main/AndroidManifest.xml".to_string()]);
        assert_eq!(labels(&entries), vec!["android.permission.VIBRATE (android)"]);
    }

    #[test]
    fn no_platform_sections_means_no_permissions() {
        let doc = ManifestDocument::parse(
            r#"<plugin><config-file target="AndroidManifest.xml">
                <uses-permission android:name="android.permission.CAMERA" />
            </config-file></plugin>"#,
        )
        .unwrap();

        assert!(scan_permissions(&doc, &targets()).is_empty());
    }

    #[test]
    fn removes_from_the_recorded_container_only() {
        let mut doc = ManifestDocument::parse(MULTI).unwrap();
        let entries = scan_permissions(&doc, &targets());

        // second CAMERA lives in the /manifest container
        assert!(remove_permission(&mut doc, &entries[2]).unwrap());

        let remaining = scan_permissions(&doc, &targets());
        assert_eq!(
            labels(&remaining),
            vec![
                "android.permission.CAMERA (android)",
                "android.permission.INTERNET (android)",
                "android.permission.ACCESS_FINE_LOCATION (amazon-fireos)",
            ]
        );
        assert_eq!(remaining[0].container, entries[0].container);
    }

    #[test]
    fn removing_twice_reports_nothing_left() {
        let mut doc = ManifestDocument::parse(MULTI).unwrap();
        let entries = scan_permissions(&doc, &targets());

        assert!(remove_permission(&mut doc, &entries[1]).unwrap());
        assert!(!remove_permission(&mut doc, &entries[1]).unwrap());
    }

    #[test]
    fn nested_permission_is_removed_from_its_parent() {
        let mut doc = ManifestDocument::parse(
            r#"<plugin><platform name="android">
                <config-file target="AndroidManifest.xml" parent="/*">
                    <uses-permission android:name="android.permission.INTERNET" />
                    <group><uses-permission android:name="android.permission.NFC" /></group>
                </config-file>
            </platform></plugin>"#,
        )
        .unwrap();
        let entries = scan_permissions(&doc, &targets());
        assert_eq!(entries.len(), 2);

        assert!(remove_permission(&mut doc, &entries[1]).unwrap());
        assert_eq!(
            labels(&scan_permissions(&doc, &targets())),
            vec!["android.permission.INTERNET (android)"]
        );
    }

    #[test]
    fn entry_from_another_document_is_rejected() {
        let source = ManifestDocument::parse(MULTI).unwrap();
        let mut other = ManifestDocument::parse(MULTI).unwrap();
        let entry = scan_permissions(&source, &targets()).remove(0);

        assert!(matches!(
            remove_permission(&mut other, &entry),
            Err(HookError::ForeignEntry(_))
        ));
    }
}
