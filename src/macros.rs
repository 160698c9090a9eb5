#[macro_export]
macro_rules! regex {
    ($pat:literal) => {{
        static RE: once_cell::sync::Lazy<regex::Regex> =
            once_cell::sync::Lazy::new(|| regex::Regex::new($pat).expect("grammar regex literal must compile"));
        &*RE
    }};
}

#[macro_export]
macro_rules! re {
    ($pat:literal) => {
        $crate::Pattern::Regex($crate::regex!($pat))
    };
}

/// An optional literal item: the rule matches with or without it.
#[macro_export]
macro_rules! opt {
    ($pat:literal) => {
        $crate::Pattern::Optional($crate::regex!($pat))
    };
}

#[macro_export]
macro_rules! pred {
    ($p:expr) => {
        $crate::Pattern::Predicate($p)
    };
}

#[macro_export]
macro_rules! rule {
    (
        name: $name:expr,
        $(intent: $intent:expr,)?
        pattern: [ $($pat:expr),* $(,)? ]
        $(, buckets: $buckets:expr)?
        $(, deps: [ $($dep:expr),* $(,)? ])?
        , prod: |$tokens_expr:ident : &[$tok_ty_expr:ty]| -> $ret_ty:ty $body_expr:block
        $(,)?
    ) => {{
        $crate::Rule {
            name: $name,
            intent: { None::<&'static str> $(.or(Some($intent)))? },
            pattern: vec![ $($pat),* ],
            production: Box::new(move |$tokens_expr: &[$tok_ty_expr]| {
                use $crate::IntoToken;
                let result: $ret_ty = $body_expr;
                result.and_then(|v| v.into_token())
            }),
            buckets: { 0 $(| $buckets)? },
            deps: &[ $($($dep),*)? ],
        }
    }};
}
