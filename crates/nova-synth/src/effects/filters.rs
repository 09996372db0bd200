//! Which classes and fields are worth watching.
//!
//! Watching every field of every reachable object would make evaluation unbearably slow, and
//! some runtime-internal state (caches, class loaders, locks) is either never observable by
//! user code or must not be rolled back.

use nova_synth_bridge::{FieldInfo, Type, OBJECT, STRING};

const IGNORED_PREFIXES: &[&str] = &[
    "sun.",
    "java.security.",
    "java.nio.",
    "java.lang.invoke.",
    "java.lang.ClassLoader",
    "java.util.Collections$Unmodifiable",
    "jdk.internal.org.objectweb.asm",
];

const IGNORED_TYPES: &[&str] = &[
    STRING,
    "java.lang.Class",
    "java.lang.CharacterDataLatin1",
    "java.lang.Integer$IntegerCache",
    "java.lang.Integer",
    "java.awt.RenderingHints",
    "java.lang.System",
    "java.lang.Shutdown",
    "java.lang.SecurityManager",
    "java.awt.color.ColorSpace",
    "java.lang.Math",
    "java.util.jar.JarFile",
    // Rolling back lock state hangs UI threads.
    "java.util.concurrent.locks.AbstractQueuedSynchronizer",
];

/// Fields that are write-once wrappers, constant empty arrays or caches.
const IGNORED_FIELDS: &[(&str, &str)] = &[
    ("javax.swing.UIDefaults", "PENDING"),
    ("javax.swing.UIManager", "classLock"),
    ("java.awt.Component", "LOCK"),
    ("sun.util.logging.PlatformLogger$Level", "levelValues"),
    ("javax.swing.MultiUIDefaults", "tables"),
    ("java.lang.ref.SoftReference", "timestamp"),
    ("java.util.HashSet", "PRESENT"),
    ("java.lang.StringBuffer", "toStringCache"),
    ("java.lang.Throwable", "UNASSIGNED_STACK"),
    ("java.awt.Container", "EMPTY_ARRAY"),
];

/// Static roots the reachability walk never descends into.
const IGNORED_STATIC_ROOTS: &[(&str, &str)] = &[
    ("sun.misc.VM", "savedProps"),
    ("java.lang.System", "props"),
    ("java.lang.SecurityManager", "packageAccess"),
    ("java.lang.SecurityManager", "rootGroup"),
    ("java.security.Security", "props"),
    ("java.security.Policy", "policy"),
    ("java.io.File", "fs"),
    ("java.lang.ClassLoader", "classes"),
    ("java.lang.reflect.Proxy", "proxyClassCache"),
    ("javax.swing.KeyStroke", "modifierKeywords"),
    ("java.awt.AWTKeyStroke", "modifierKeywords"),
    ("java.awt.VKCollection", "code2name"),
    ("java.awt.VKCollection", "name2code"),
    ("java.lang.Package", "pkgs"),
    ("java.lang.Package", "mans"),
    ("java.lang.Package", "urls"),
    ("java.lang.ProcessEnvironment", "theEnvironment"),
    ("java.lang.ProcessEnvironment", "theUnmodifiableEnvironment"),
    ("java.lang.ApplicationShutdownHooks", "hooks"),
    ("java.awt.Toolkit", "desktopProperties"),
    ("java.awt.Toolkit", "resources"),
    ("java.awt.font.TextAttribute", "instanceMap"),
    ("java.text.AttributedCharacterIterator$Attribute", "instanceMap"),
    ("java.awt.RenderingHints$Key", "identitymap"),
];

const IGNORED_STATIC_ROOT_TYPES: &[&str] = &[
    "java.lang.Integer$IntegerCache",
    "java.lang.Short$ShortCache",
    "java.lang.Long$LongCache",
    "java.lang.Character$CharacterCache",
    "java.lang.Byte$ByteCache",
    "java.util.Locale",
    "sun.util.locale.BaseLocale",
    "java.lang.CharacterDataLatin1",
    "java.lang.invoke.LambdaForm$NamedFunction",
    "java.lang.invoke.MethodType",
    "sun.util.calendar.ZoneInfoFile",
    "sun.launcher.LauncherHelper",
    "java.lang.Class",
    "java.util.ResourceBundle$RBClassLoader",
];

const IGNORED_STATIC_ROOT_PREFIXES: &[&str] = &[
    "sun.",
    "java.security.",
    "java.nio.",
    "java.lang.ref.",
    "java.lang.invoke.",
    "java.lang.ClassLoader",
];

/// Classes in the synthesizer's own helper package.
fn is_helper_class(class: &str) -> bool {
    class
        .strip_prefix("codehint.")
        .is_some_and(|rest| !rest.contains('.'))
}

pub(crate) fn is_useful_type(class: &str) -> bool {
    !(is_helper_class(class)
        || IGNORED_TYPES.contains(&class)
        || IGNORED_PREFIXES.iter().any(|p| class.starts_with(p)))
}

/// `declaring` declares the field; `object_type` is the runtime type it was found on.
pub(crate) fn is_useful_field(declaring: &str, name: &str, object_type: &str) -> bool {
    if IGNORED_FIELDS.contains(&(declaring, name)) || declaring == "java.awt.image.DirectColorModel" {
        return false;
    }
    if (declaring.starts_with("java.awt.") || declaring.starts_with("javax.swing."))
        && name == "accessibleContext"
    {
        return false;
    }
    // Lazily created views over the map itself.
    if declaring == "java.util.AbstractMap"
        && object_type.starts_with("java.util.")
        && matches!(name, "keySet" | "values")
    {
        return false;
    }
    !(object_type == "java.util.concurrent.ConcurrentHashMap"
        && matches!(name, "keySet" | "values" | "entrySet"))
}

/// Whether the reachability walk follows the field `name` declared in `class`.
pub(crate) fn is_useful_root(class: &str, name: &str) -> bool {
    if is_helper_class(class)
        || IGNORED_STATIC_ROOT_TYPES.contains(&class)
        || IGNORED_STATIC_ROOTS.contains(&(class, name))
        || IGNORED_STATIC_ROOT_PREFIXES.iter().any(|p| class.starts_with(p))
        || class.starts_with("sun.misc.Launcher")
        || (class == "com.sun.swing.internal.plaf.basic.resources.basic" && name == "NONEXISTENT_BUNDLE")
    {
        return false;
    }
    !(class.starts_with("java.") && class.ends_with("ClassLoader") && name == "scl")
}

/// Array element writes are invisible to watchpoints, so fields that may hold an array are
/// also watched for reads.
pub(crate) fn can_be_array(ty: &Type) -> bool {
    ty.is_array() || ty.class_name() == Some(OBJECT)
}

/// Final fields are watched only when they may hold an array.
pub(crate) fn is_watchable(field: &FieldInfo) -> bool {
    !field.modifiers.is_final || can_be_array(&field.ty)
}

#[cfg(test)]
mod tests {
    use nova_synth_bridge::Modifiers;

    use super::*;

    #[test]
    fn runtime_internals_are_not_watched() {
        assert!(!is_useful_type("java.lang.String"));
        assert!(!is_useful_type("sun.misc.Unsafe"));
        assert!(!is_useful_type("codehint.CodeHint"));
        assert!(is_useful_type("codehint.demo.Point"));
        assert!(is_useful_type("java.util.ArrayList"));
    }

    #[test]
    fn map_views_are_skipped_only_for_library_maps() {
        assert!(!is_useful_field("java.util.AbstractMap", "keySet", "java.util.HashMap"));
        assert!(is_useful_field("java.util.AbstractMap", "keySet", "com.example.MyMap"));
        assert!(!is_useful_field("java.lang.Throwable", "UNASSIGNED_STACK", "java.lang.Throwable"));
    }

    #[test]
    fn class_loader_roots_are_skipped() {
        assert!(!is_useful_root("java.lang.ClassLoader", "scl"));
        assert!(!is_useful_root("java.lang.Integer$IntegerCache", "cache"));
        assert!(is_useful_root("Main", "counter"));
    }

    #[test]
    fn final_fields_are_watched_only_if_they_can_hold_arrays() {
        let final_int = FieldInfo::new("A", "x", Type::int(), Modifiers::PRIVATE.with_final());
        let final_array = FieldInfo::new("A", "xs", Type::array_of(Type::int()), Modifiers::PRIVATE.with_final());
        let final_object = FieldInfo::new("A", "o", Type::object(), Modifiers::PRIVATE.with_final());
        assert!(!is_watchable(&final_int));
        assert!(is_watchable(&final_array));
        assert!(is_watchable(&final_object));
        assert!(is_watchable(&FieldInfo::new("A", "y", Type::int(), Modifiers::PRIVATE)));
    }
}
