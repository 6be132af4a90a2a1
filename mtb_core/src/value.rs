//! Semantic parameter types and structural defaults.
//!
//! Every action parameter carries a [`TypeInfo`] and a way to synthesize a
//! default value without any owner state. Both come from the [`ParamType`]
//! trait, so the choice is made at compile time through generics:
//!
//! - scalars and `String`: their zero value
//! - `Option<T>`: `None`
//! - enumerations (via [`enum_param!`](crate::enum_param)): the first variant
//! - records (via [`record_param!`](crate::record_param)): every field defaulted
//! - collections and opaque JSON: no default (`ModelError::UnsupportedDefault`)

use crate::error::ModelError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Structural classification of a parameter type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TypeKind {
    Scalar,
    Optional { inner: Box<TypeInfo> },
    Enumeration { variants: Vec<&'static str> },
    Record { fields: Vec<FieldInfo> },
    Collection { element: Box<TypeInfo> },
    Opaque,
}

/// Semantic type of an action parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TypeInfo {
    pub name: String,
    #[serde(flatten)]
    pub kind: TypeKind,
}

/// A named field of a record type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldInfo {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub ty: TypeInfo,
}

impl TypeInfo {
    pub fn scalar(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Scalar,
        }
    }

    pub fn enumeration(name: impl Into<String>, variants: &[&'static str]) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Enumeration {
                variants: variants.to_vec(),
            },
        }
    }

    pub fn record(name: impl Into<String>, fields: Vec<FieldInfo>) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Record { fields },
        }
    }

    pub fn collection(name: impl Into<String>, element: TypeInfo) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Collection {
                element: Box::new(element),
            },
        }
    }

    pub fn opaque(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: TypeKind::Opaque,
        }
    }

    /// Renders a serialized value of this type the way `Debug` renders the
    /// typed value: enum variants by name, records as `Name { field: .. }`.
    pub fn render(&self, value: &Value) -> String {
        match (&self.kind, value) {
            (TypeKind::Optional { .. }, Value::Null) => "None".to_string(),
            (TypeKind::Optional { inner }, value) => format!("Some({})", inner.render(value)),
            (TypeKind::Enumeration { .. }, Value::String(variant)) => variant.clone(),
            (TypeKind::Record { fields }, Value::Object(map)) => {
                let rendered: Option<Vec<String>> = fields
                    .iter()
                    .map(|f| map.get(f.name).map(|v| format!("{}: {}", f.name, f.ty.render(v))))
                    .collect();
                match rendered {
                    Some(fields) if fields.is_empty() => self.name.clone(),
                    Some(fields) => format!("{} {{ {} }}", self.name, fields.join(", ")),
                    None => value.to_string(),
                }
            }
            (TypeKind::Collection { element }, Value::Array(items)) => {
                let items: Vec<String> = items.iter().map(|v| element.render(v)).collect();
                format!("[{}]", items.join(", "))
            }
            _ => value.to_string(),
        }
    }

    /// Returns true if a structural default exists for this type.
    pub fn has_structural_default(&self) -> bool {
        match &self.kind {
            TypeKind::Scalar | TypeKind::Optional { .. } | TypeKind::Enumeration { .. } => true,
            TypeKind::Record { fields } => fields.iter().all(|f| f.ty.has_structural_default()),
            TypeKind::Collection { .. } | TypeKind::Opaque => false,
        }
    }
}

impl fmt::Display for TypeInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl FieldInfo {
    pub fn new(name: &'static str, ty: TypeInfo) -> Self {
        Self { name, ty }
    }
}

/// A type usable as an action parameter.
pub trait ParamType: Serialize + DeserializeOwned + Clone + fmt::Debug + 'static {
    /// Semantic type descriptor.
    fn type_info() -> TypeInfo;

    /// Default value derived from the type alone.
    fn structural_default() -> Result<Self, ModelError>;
}

/// Serialized structural default of `T`.
pub(crate) fn structural_value<T: ParamType>() -> Result<serde_json::Value, ModelError> {
    Ok(serde_json::to_value(T::structural_default()?)?)
}

macro_rules! scalar_params {
    ($($ty:ty),* $(,)?) => {
        $(
            impl ParamType for $ty {
                fn type_info() -> TypeInfo {
                    TypeInfo::scalar(stringify!($ty))
                }

                fn structural_default() -> Result<Self, ModelError> {
                    Ok(<$ty>::default())
                }
            }
        )*
    };
}

scalar_params!(bool, char, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, String);

impl<T: ParamType> ParamType for Option<T> {
    fn type_info() -> TypeInfo {
        let inner = T::type_info();
        TypeInfo {
            name: format!("Option<{}>", inner.name),
            kind: TypeKind::Optional {
                inner: Box::new(inner),
            },
        }
    }

    fn structural_default() -> Result<Self, ModelError> {
        Ok(None)
    }
}

impl<T: ParamType> ParamType for Vec<T> {
    fn type_info() -> TypeInfo {
        let element = T::type_info();
        TypeInfo::collection(format!("Vec<{}>", element.name), element)
    }

    fn structural_default() -> Result<Self, ModelError> {
        Err(ModelError::UnsupportedDefault(Self::type_info().name))
    }
}

impl<T: ParamType> ParamType for BTreeMap<String, T> {
    fn type_info() -> TypeInfo {
        let element = T::type_info();
        TypeInfo::collection(format!("BTreeMap<String, {}>", element.name), element)
    }

    fn structural_default() -> Result<Self, ModelError> {
        Err(ModelError::UnsupportedDefault(Self::type_info().name))
    }
}

impl<T: ParamType> ParamType for HashMap<String, T> {
    fn type_info() -> TypeInfo {
        let element = T::type_info();
        TypeInfo::collection(format!("HashMap<String, {}>", element.name), element)
    }

    fn structural_default() -> Result<Self, ModelError> {
        Err(ModelError::UnsupportedDefault(Self::type_info().name))
    }
}

impl ParamType for serde_json::Value {
    fn type_info() -> TypeInfo {
        TypeInfo::opaque("Value")
    }

    fn structural_default() -> Result<Self, ModelError> {
        Err(ModelError::UnsupportedDefault("Value".to_string()))
    }
}

/// Implements [`ParamType`] for a fieldless enum.
///
/// List the variants in declaration order; the first one is the structural
/// default.
///
/// ```ignore
/// enum_param!(MenuItem { Withdraw, Balance, Quit });
/// ```
#[macro_export]
macro_rules! enum_param {
    ($ty:ident { $first:ident $(, $rest:ident)* $(,)? }) => {
        impl $crate::ParamType for $ty {
            fn type_info() -> $crate::TypeInfo {
                $crate::TypeInfo::enumeration(
                    stringify!($ty),
                    &[stringify!($first) $(, stringify!($rest))*],
                )
            }

            fn structural_default() -> ::core::result::Result<Self, $crate::ModelError> {
                Ok($ty::$first)
            }
        }
    };
}

/// Implements [`ParamType`] for a record whose fields are all `ParamType`s.
///
/// ```ignore
/// record_param!(Card { name: String, pin: String });
/// ```
#[macro_export]
macro_rules! record_param {
    ($ty:ident { $($field:ident : $fty:ty),* $(,)? }) => {
        impl $crate::ParamType for $ty {
            fn type_info() -> $crate::TypeInfo {
                $crate::TypeInfo::record(
                    stringify!($ty),
                    vec![
                        $(
                            $crate::FieldInfo::new(
                                stringify!($field),
                                <$fty as $crate::ParamType>::type_info(),
                            )
                        ),*
                    ],
                )
            }

            fn structural_default() -> ::core::result::Result<Self, $crate::ModelError> {
                Ok($ty {
                    $($field: <$fty as $crate::ParamType>::structural_default()?),*
                })
            }
        }
    };
}
