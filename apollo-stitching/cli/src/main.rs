use std::fs;
use std::io;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use anyhow::anyhow;
use apollo_compiler::Schema;
use apollo_stitching::LocalExecutor;
use apollo_stitching::MergeOptions;
use apollo_stitching::MergedSchema;
use apollo_stitching::Subschema;
use apollo_stitching::graphql;
use apollo_stitching::heal_schema;
use apollo_stitching::json_ext::Object;
use clap::Parser;
use schemars::JsonSchema;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

/// CLI arguments. See <https://docs.rs/clap/latest/clap/_derive/index.html>
#[derive(Parser)]
struct Args {
    /// Log filter, overridden by `RUST_LOG`
    #[arg(long = "log", default_value = "info")]
    env_filter: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Merges schema files, one subschema each, and prints the merged schema
    Compose {
        /// The paths to the subschema files
        schemas: Vec<PathBuf>,
    },
    /// Removes what can no longer be queried from a schema and prints it
    Heal {
        /// The path to the schema file, or `-` for stdin
        schema: PathBuf,
    },
    /// Executes a query against the subschemas of a stitching configuration, answering
    /// from their mocked data
    Execute {
        /// The path to the YAML stitching configuration
        #[arg(long)]
        config: PathBuf,
        /// The path to the query file, or `-` for stdin
        #[arg(long)]
        query: PathBuf,
        /// Variables, as a JSON object
        #[arg(long)]
        variables: Option<String>,
        /// The name of the operation to execute
        #[arg(long)]
        operation_name: Option<String>,
    },
    /// Prints the JSON schema of the stitching configuration
    ConfigSchema,
}

/// A stitching configuration.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct StitchingConfig {
    /// The subschemas, in registration order
    subschemas: Vec<SubschemaConfig>,

    /// SDL added to the merged schema
    #[serde(default)]
    type_extensions: Option<String>,

    #[serde(default)]
    options: MergeOptions,
}

/// A subschema answering from mocked data.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct SubschemaConfig {
    name: String,

    /// The path to the subschema's SDL, relative to the configuration file
    #[serde(default)]
    schema_path: Option<PathBuf>,

    /// The subschema's SDL, instead of `schema_path`
    #[serde(default)]
    sdl: Option<String>,

    /// The value of the query root
    #[serde(default)]
    query: serde_json::Map<String, serde_json::Value>,

    /// The value of the mutation root; mutations are rejected without it
    #[serde(default)]
    mutation: Option<serde_json::Map<String, serde_json::Value>>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let env_filter = std::env::var("RUST_LOG").unwrap_or(args.env_filter);
    tracing_subscriber::fmt::fmt()
        .with_env_filter(EnvFilter::try_new(&env_filter).context("could not parse log")?)
        .with_writer(io::stderr)
        .init();

    match args.command {
        Command::Compose { schemas } => compose(&schemas),
        Command::Heal { schema } => heal(&schema),
        Command::Execute {
            config,
            query,
            variables,
            operation_name,
        } => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?;
            runtime.block_on(execute(&config, &query, variables.as_deref(), operation_name))
        }
        Command::ConfigSchema => {
            let schema = schemars::schema_for!(StitchingConfig);
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(())
        }
    }
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        io::read_to_string(io::stdin()).context("could not read stdin")
    } else {
        fs::read_to_string(path).with_context(|| format!("could not read {}", path.display()))
    }
}

fn compose(paths: &[PathBuf]) -> Result<()> {
    let mut subschemas = Vec::with_capacity(paths.len());
    for path in paths {
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .ok_or_else(|| anyhow!("no subschema name in {}", path.display()))?;
        let sdl = read_input(path)?;
        subschemas.push(local_subschema(&name, &sdl, Default::default(), None)?);
    }
    let merged = MergedSchema::builder().subschemas(subschemas).build()?;
    println!("{}", merged.schema());
    Ok(())
}

fn heal(path: &Path) -> Result<()> {
    let mut schema = Schema::parse(read_input(path)?, path)
        .map_err(|invalid| anyhow!("invalid schema:\n{}", invalid.errors))?;
    println!("{}", heal_schema(&mut schema));
    Ok(())
}

async fn execute(
    config_path: &Path,
    query_path: &Path,
    variables: Option<&str>,
    operation_name: Option<String>,
) -> Result<()> {
    let config: StitchingConfig = serde_yaml::from_str(&read_input(config_path)?)
        .with_context(|| format!("invalid configuration {}", config_path.display()))?;
    let base = config_path.parent().unwrap_or(Path::new("."));
    let merged = merged_schema(config, base)?;

    let variables: Object = match variables {
        Some(variables) => serde_json::from_str(variables).context("invalid variables")?,
        None => Default::default(),
    };
    let request = graphql::Request::builder()
        .query(read_input(query_path)?)
        .and_operation_name(operation_name)
        .variables(variables)
        .build();
    let response = merged.execute(request).await;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn merged_schema(config: StitchingConfig, base: &Path) -> Result<MergedSchema> {
    let mut subschemas = Vec::with_capacity(config.subschemas.len());
    for subschema in config.subschemas {
        let sdl = match (subschema.sdl, subschema.schema_path) {
            (Some(sdl), _) => sdl,
            (None, Some(path)) => read_input(&base.join(path))?,
            (None, None) => {
                return Err(anyhow!(
                    "subschema '{}' needs either `sdl` or `schema_path`",
                    subschema.name
                ));
            }
        };
        subschemas.push(local_subschema(
            &subschema.name,
            &sdl,
            subschema.query,
            subschema.mutation,
        )?);
    }
    Ok(MergedSchema::builder()
        .subschemas(subschemas)
        .and_type_extensions(config.type_extensions)
        .options(config.options)
        .build()?)
}

fn local_subschema(
    name: &str,
    sdl: &str,
    query: serde_json::Map<String, serde_json::Value>,
    mutation: Option<serde_json::Map<String, serde_json::Value>>,
) -> Result<Subschema> {
    let schema = Schema::parse_and_validate(sdl, format!("{name}.graphql"))
        .map_err(|invalid| anyhow!("subschema '{name}' is invalid:\n{}", invalid.errors))?;
    let root = |value: serde_json::Map<String, serde_json::Value>| {
        serde_json_bytes::Value::from(serde_json::Value::Object(value))
            .as_object()
            .cloned()
            .unwrap_or_default()
    };
    let mut executor = LocalExecutor::new(Arc::new(schema.clone()), root(query));
    if let Some(mutation) = mutation {
        executor = executor.with_mutation(root(mutation));
    }
    Ok(Subschema::new(name, schema, Arc::new(executor))?)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const CONFIG: &str = r#"
subschemas:
  - name: users
    sdl: "type Query { me: User } type User { id: ID! name: String }"
    query:
      me:
        id: "1"
        name: Ada
  - name: posts
    sdl: "type Query { latest: Post } type Post { title: String }"
    query:
      latest:
        title: Hello
options:
  conflict_strategy: last_wins
"#;

    #[tokio::test]
    async fn executes_against_a_configuration() {
        let config: StitchingConfig = serde_yaml::from_str(CONFIG).unwrap();
        assert_eq!(
            config.options.conflict_strategy,
            apollo_stitching::ConflictStrategy::LastWins
        );
        let merged = merged_schema(config, Path::new(".")).unwrap();
        let response = merged
            .execute(
                graphql::Request::builder()
                    .query("{ me { name } latest { title } }")
                    .build(),
            )
            .await;
        insta::assert_json_snapshot!(response, @r###"
        {
          "data": {
            "me": {
              "name": "Ada"
            },
            "latest": {
              "title": "Hello"
            }
          }
        }
        "###);
    }

    #[test]
    fn subschemas_need_a_schema() {
        let config: StitchingConfig =
            serde_yaml::from_str("subschemas:\n  - name: empty\n").unwrap();
        let error = merged_schema(config, Path::new(".")).err().unwrap();
        assert_eq!(
            error.to_string(),
            "subschema 'empty' needs either `sdl` or `schema_path`"
        );
    }

    #[test]
    fn unknown_configuration_keys_are_rejected() {
        assert!(serde_yaml::from_str::<StitchingConfig>("subschemas: []\nextra: 1\n").is_err());
    }

    #[test]
    fn configuration_schema_lists_subschemas() {
        let schema = serde_json::to_value(schemars::schema_for!(StitchingConfig)).unwrap();
        assert!(schema["properties"]["subschemas"].is_object());
        assert!(schema["definitions"]["MergeOptions"].is_object());
    }
}
