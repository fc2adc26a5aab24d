use std::fmt::{self, Display, Formatter};

use super::LabelSet;

/// Rendered for an optional field which is absent.
const NIL: &str = "<nil>";

#[derive(Debug, PartialEq, thiserror::Error)]
#[error("invalid label name \"{0}\", only letters, digits and underscore are allowed")]
pub struct InvalidLabelName(pub String);

/// Static description of one field of a [`Record`].
///
/// The tables are declared once per record type, so the projection never
/// inspects types at runtime and always walks fields in declaration order.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Field {
    /// The serialization name, it is the fallback label name
    pub name: &'static str,
    /// Overrides the serialization name when building the label name
    pub label: Option<&'static str>,
    /// Excluded fields are nested records which the caller projects on its
    /// own, rendering them into one label is useless.
    pub excluded: bool,
}

impl Field {
    pub const fn new(name: &'static str) -> Self {
        Field {
            name,
            label: None,
            excluded: false,
        }
    }

    pub const fn label(mut self, label: &'static str) -> Self {
        self.label = Some(label);
        self
    }

    pub const fn excluded(mut self) -> Self {
        self.excluded = true;
        self
    }

    fn resolve(&self) -> Option<&'static str> {
        if self.excluded {
            return None;
        }

        let name = self.label.unwrap_or(self.name);
        if name.is_empty() { None } else { Some(name) }
    }
}

/// A borrowed view of a field's value.
pub enum FieldValue<'a> {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Str(&'a str),
    Optional(Option<Box<FieldValue<'a>>>),
    List(Vec<FieldValue<'a>>),
    Record(&'a dyn Record),
}

impl Display for FieldValue<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(b) => write!(f, "{b}"),
            FieldValue::Int(i) => write!(f, "{i}"),
            FieldValue::Uint(u) => write!(f, "{u}"),
            FieldValue::Str(s) => f.write_str(s),
            FieldValue::Optional(None) => f.write_str(NIL),
            FieldValue::Optional(Some(value)) => value.fmt(f),
            FieldValue::List(items) => {
                f.write_str("[")?;
                for (index, item) in items.iter().enumerate() {
                    if index != 0 {
                        f.write_str(" ")?;
                    }
                    item.fmt(f)?;
                }
                f.write_str("]")
            }
            FieldValue::Record(record) => {
                f.write_str("{")?;
                for (index, (field, value)) in record.fields().iter().enumerate() {
                    if index != 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{}:{}", field.name, value)?;
                }
                f.write_str("}")
            }
        }
    }
}

impl From<bool> for FieldValue<'_> {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

macro_rules! impl_from_signed {
    ($($typ:ty),+) => {
        $(
            impl From<$typ> for FieldValue<'_> {
                fn from(value: $typ) -> Self {
                    FieldValue::Int(i64::from(value))
                }
            }
        )+
    };
}

macro_rules! impl_from_unsigned {
    ($($typ:ty),+) => {
        $(
            impl From<$typ> for FieldValue<'_> {
                fn from(value: $typ) -> Self {
                    FieldValue::Uint(u64::from(value))
                }
            }
        )+
    };
}

impl_from_signed!(i8, i16, i32);
impl_from_unsigned!(u8, u16, u32);

impl From<i64> for FieldValue<'_> {
    fn from(value: i64) -> Self {
        FieldValue::Int(value)
    }
}

impl From<u64> for FieldValue<'_> {
    fn from(value: u64) -> Self {
        FieldValue::Uint(value)
    }
}

impl<'a> From<&'a str> for FieldValue<'a> {
    fn from(value: &'a str) -> Self {
        FieldValue::Str(value)
    }
}

impl<'a> From<&'a String> for FieldValue<'a> {
    fn from(value: &'a String) -> Self {
        FieldValue::Str(value.as_str())
    }
}

impl<'a> From<&'a Option<String>> for FieldValue<'a> {
    fn from(value: &'a Option<String>) -> Self {
        FieldValue::Optional(value.as_ref().map(|s| Box::new(FieldValue::from(s))))
    }
}

impl<'a> From<&'a Vec<String>> for FieldValue<'a> {
    fn from(value: &'a Vec<String>) -> Self {
        FieldValue::List(value.iter().map(FieldValue::from).collect())
    }
}

/// A record whose fields can be turned into labels.
///
/// Implementations declare a `static` table of [`Field`]s and pair it with the
/// values through [`zip_fields`], which makes a table/value count mismatch a
/// compile error.
pub trait Record {
    fn fields(&self) -> Vec<(&'static Field, FieldValue<'_>)>;
}

pub fn zip_fields<'a, const N: usize>(
    fields: &'static [Field; N],
    values: [FieldValue<'a>; N],
) -> Vec<(&'static Field, FieldValue<'a>)> {
    fields.iter().zip(values).collect()
}

/// Label names must match `[a-zA-Z_][a-zA-Z0-9_]*`
pub fn is_valid_label_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }

    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Add every non-excluded field of `record` into `labels`, the key is
/// `prefix` followed by the field's label name.
pub fn project_into(
    record: &dyn Record,
    prefix: &str,
    labels: &mut LabelSet,
) -> Result<(), InvalidLabelName> {
    for (field, value) in record.fields() {
        let Some(name) = field.resolve() else {
            continue;
        };

        let key = format!("{prefix}{name}");
        if !is_valid_label_name(&key) {
            return Err(InvalidLabelName(key));
        }

        labels.insert(key, value.to_string());
    }

    Ok(())
}

pub fn project(record: &dyn Record, prefix: &str) -> Result<LabelSet, InvalidLabelName> {
    let mut labels = LabelSet::new();
    project_into(record, prefix, &mut labels)?;
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    struct Inner {
        a: String,
        b: u16,
    }

    static INNER_FIELDS: [Field; 2] = [Field::new("a"), Field::new("b")];

    impl Record for Inner {
        fn fields(&self) -> Vec<(&'static Field, FieldValue<'_>)> {
            zip_fields(&INNER_FIELDS, [(&self.a).into(), self.b.into()])
        }
    }

    struct Outer {
        enabled: bool,
        count: i32,
        name: String,
        note: Option<String>,
        tags: Vec<String>,
        inner: Inner,
        hidden: Inner,
        unnamed: String,
    }

    static OUTER_FIELDS: [Field; 8] = [
        Field::new("enabled"),
        Field::new("count"),
        Field::new("name").label("display_name"),
        Field::new("note"),
        Field::new("tags"),
        Field::new("inner"),
        Field::new("hidden").excluded(),
        Field::new(""),
    ];

    impl Record for Outer {
        fn fields(&self) -> Vec<(&'static Field, FieldValue<'_>)> {
            zip_fields(
                &OUTER_FIELDS,
                [
                    self.enabled.into(),
                    self.count.into(),
                    (&self.name).into(),
                    (&self.note).into(),
                    (&self.tags).into(),
                    FieldValue::Record(&self.inner),
                    FieldValue::Record(&self.hidden),
                    (&self.unnamed).into(),
                ],
            )
        }
    }

    fn outer() -> Outer {
        Outer {
            enabled: true,
            count: -3,
            name: "foo".into(),
            note: None,
            tags: vec!["x".into(), "y".into()],
            inner: Inner {
                a: "bar".into(),
                b: 8,
            },
            hidden: Inner {
                a: "secret".into(),
                b: 1,
            },
            unnamed: "dropped".into(),
        }
    }

    #[test]
    fn projection() {
        let labels = project(&outer(), "prefix_").unwrap();

        let want = [
            ("prefix_enabled", "true"),
            ("prefix_count", "-3"),
            ("prefix_display_name", "foo"),
            ("prefix_note", "<nil>"),
            ("prefix_tags", "[x y]"),
            ("prefix_inner", "{a:bar b:8}"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect::<LabelSet>();

        assert_eq!(labels, want);
    }

    #[test]
    fn idempotent() {
        let record = outer();

        let first = project(&record, "p_").unwrap();
        let second = project(&record, "p_").unwrap();
        assert_eq!(first, second);
        assert_eq!(
            first.keys().collect::<Vec<_>>(),
            second.keys().collect::<Vec<_>>()
        );
    }

    #[test]
    fn present_optional_and_empty_list() {
        let mut record = outer();
        record.note = Some("hello".into());
        record.tags = vec![];

        let labels = project(&record, "p_").unwrap();
        assert_eq!(labels["p_note"], "hello");
        assert_eq!(labels["p_tags"], "[]");
    }

    #[test]
    fn project_into_keeps_existing() {
        let mut labels = LabelSet::new();
        labels.insert("instance".to_string(), "abc".to_string());

        project_into(&outer().inner, "p_", &mut labels).unwrap();

        assert_eq!(labels.len(), 3);
        assert_eq!(labels["instance"], "abc");
        assert_eq!(labels["p_a"], "bar");
        assert_eq!(labels["p_b"], "8");
    }

    #[test]
    fn invalid_prefix() {
        let err = project(&outer(), "bad-prefix_").unwrap_err();
        assert_eq!(err, InvalidLabelName("bad-prefix_enabled".to_string()));
    }

    #[test]
    fn label_names() {
        for (input, want) in [
            ("__address__", true),
            ("instance", true),
            ("_x1", true),
            ("a_B_9", true),
            ("", false),
            ("9abc", false),
            ("foo-bar", false),
            ("foo.bar", false),
            ("héllo", false),
        ] {
            assert_eq!(is_valid_label_name(input), want, "{input}");
        }
    }
}
