//! Rust runtime binding emission.
//!
//! The generated module embeds the schema source and builds the shared
//! [`rustymsg::Schema`] and [`rustymsg::MessageRegistry`] lazily; every
//! guaranteed per-message operation (validated construction, pack, unpack,
//! equality, length, introspection, random sampling, CLI registration)
//! comes from the runtime crate the module re-exports.

use heck::ToShoutySnakeCase;
use indoc::formatdoc;
use rustymsg::Schema;
use std::fmt::Write as _;

/// Emits one Rust module binding a schema to the `rustymsg` runtime.
pub struct RustBindingsEmitter<'s> {
    schema: &'s Schema,
    schema_source: &'s str,
    schema_name: String,
}

impl<'s> RustBindingsEmitter<'s> {
    /// Creates an emitter. `schema_name` labels the generated module
    /// docs; `schema_source` is embedded verbatim.
    #[must_use]
    pub fn new(schema: &'s Schema, schema_source: &'s str, schema_name: &str) -> Self {
        Self {
            schema,
            schema_source,
            schema_name: schema_name.to_owned(),
        }
    }

    /// Renders the module text.
    #[must_use]
    pub fn emit(&self) -> String {
        let mut consts = String::new();
        for def in self.schema.messages() {
            if let Some(id) = def.id {
                let _ = writeln!(
                    consts,
                    "/// {}\npub const {}_ID: u8 = 0x{id:02X};",
                    def.desc,
                    def.name.to_shouty_snake_case()
                );
            }
        }

        formatdoc! {r##"
            //! Message bindings for schema `{name}`.
            //!
            //! Generated by rustymsg-codegen {version}; do not edit.

            pub use rustymsg::{{
                autotest, decode, encode, sample_message, Created, MessageBuilder,
                MessageRegistry, MessageValue, Schema,
            }};
            use std::sync::{{Arc, OnceLock}};

            /// The schema this module was generated from.
            pub const SCHEMA_SOURCE: &str = r#"{source}"#;

            {consts}
            /// The loaded schema, built once on first use.
            pub fn schema() -> &'static Arc<Schema> {{
                static SCHEMA: OnceLock<Arc<Schema>> = OnceLock::new();
                SCHEMA.get_or_init(|| {{
                    Arc::new(
                        Schema::from_json_str(SCHEMA_SOURCE)
                            .expect("embedded schema source is valid"),
                    )
                }})
            }}

            /// The id-keyed message registry over [`schema`].
            pub fn registry() -> &'static MessageRegistry {{
                static REGISTRY: OnceLock<MessageRegistry> = OnceLock::new();
                REGISTRY.get_or_init(|| MessageRegistry::new(schema().clone()))
            }}

            /// One clap subcommand per message, for a dispatching front-end.
            pub fn subcommands() -> Vec<clap::Command> {{
                rustymsg::cli::subcommands(schema())
            }}

            /// Round-trips `iterations` random instances of every message.
            pub fn run_autotest(iterations: usize) -> rustymsg::CodecResult<()> {{
                autotest(schema(), iterations, &mut rand::rng())
            }}
        "##,
            name = self.schema_name,
            version = crate::VERSION,
            source = self.schema_source,
            consts = consts,
        }
    }
}
