//! Contextinator CLI — ingest a repository into a searchable chunk index and
//! query it from the terminal, calling `contextinator-core` directly with no
//! server in between.

use std::io;
use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};

use contextinator_core::config::Config;
use contextinator_core::error::ContextinatorError;
use contextinator_core::orchestrator::{chunk_repo, process_repo, IngestOptions};
use contextinator_core::persistence::{
    read_chunks_manifest, read_embeddings_manifest, write_chunks_manifest, write_embeddings_manifest,
};
use contextinator_core::search::{
    grep_search, read_file as search_read_file, regex_search, repo_structure, semantic_search, symbol_search,
    SemanticFilters,
};
use contextinator_core::vectorstore::{sanitize_collection_name, VectorStore};
use contextinator_core::{embedding, types};

/// Contextinator — clone, chunk, embed, and search a codebase.
#[derive(Parser)]
#[command(name = "contextinator", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output as JSON instead of human-readable text
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover, parse, and chunk a repository without embedding it
    Chunk {
        /// Git URL to shallow-clone
        #[arg(long)]
        repo_url: Option<String>,
        /// Local path to an already-checked-out repository
        #[arg(long)]
        path: Option<PathBuf>,
        /// Directory the chunks manifest is written under
        #[arg(long)]
        chunks_dir: Option<PathBuf>,
        /// Write the manifest to disk
        #[arg(long)]
        save: bool,
    },
    /// Embed a previously written chunks manifest
    Embed {
        /// Directory holding `chunks.json`
        #[arg(long)]
        chunks_dir: PathBuf,
        /// Directory the embeddings manifest is written under
        #[arg(long)]
        embeddings_dir: Option<PathBuf>,
        /// Write the manifest to disk
        #[arg(long)]
        save: bool,
    },
    /// Upsert a previously written embeddings manifest into the vector store
    StoreEmbeddings {
        /// Directory holding `embeddings.json`
        #[arg(long)]
        embeddings_dir: PathBuf,
        /// Target collection name
        #[arg(long)]
        collection: String,
        /// Recreate the collection empty before storing
        #[arg(long)]
        clear_existing: bool,
    },
    /// Run chunk, embed, and store-embeddings as one pipeline
    ChunkEmbedStoreEmbeddings {
        #[arg(long)]
        repo_url: Option<String>,
        #[arg(long)]
        path: Option<PathBuf>,
        /// Target collection name (defaults to the repo's directory name)
        #[arg(long)]
        collection: Option<String>,
        #[arg(long)]
        clear_existing: bool,
    },
    /// Print the on-disk directory tree of a repository
    Structure {
        #[arg(long)]
        path: PathBuf,
        #[arg(long, default_value = "6")]
        max_depth: usize,
    },
    /// Semantic search over an ingested collection
    Search {
        #[arg(long)]
        collection: String,
        query: String,
        #[arg(long, default_value = "10")]
        top_n: usize,
        #[arg(long)]
        language: Option<String>,
    },
    /// Search for a symbol by name
    Symbol {
        #[arg(long)]
        collection: String,
        name: String,
        #[arg(long)]
        symbol_type: Option<String>,
        #[arg(long)]
        language: Option<String>,
        #[arg(long)]
        exact: bool,
    },
    /// Literal or regex pattern search over a collection's documents
    Pattern {
        #[arg(long)]
        collection: String,
        pattern: String,
        #[arg(long)]
        regex: bool,
        #[arg(long)]
        case_sensitive: bool,
        #[arg(long)]
        whole_word: bool,
        #[arg(long, default_value = "0")]
        context_lines: usize,
        #[arg(long, default_value = "100")]
        max_chunks: usize,
    },
    /// Reconstruct a file from its stored chunks
    ReadFile {
        #[arg(long)]
        collection: String,
        file_path: String,
        #[arg(long)]
        node_type: Option<String>,
    },
    /// Semantic search with the full metadata filter set
    SearchAdvanced {
        #[arg(long)]
        collection: String,
        query: String,
        #[arg(long, default_value = "10")]
        top_n: usize,
        #[arg(long)]
        language: Option<String>,
        #[arg(long)]
        file_path_contains: Option<String>,
        #[arg(long)]
        node_type: Option<String>,
        #[arg(long)]
        exclude_parents: bool,
    },
    /// Show a collection's point count and backend
    DbInfo {
        #[arg(long)]
        collection: String,
    },
    /// List every known collection
    DbList,
    /// Dump the stored metadata for a collection's points
    DbShow {
        #[arg(long)]
        collection: String,
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Delete a collection entirely
    DbClear {
        #[arg(long)]
        collection: String,
    },
    /// Generate shell completion scripts
    Completions {
        shell: Shell,
    },
}

fn resolve_repo_source(repo_url: Option<String>, path: Option<PathBuf>) -> Result<String, String> {
    match (repo_url, path) {
        (Some(url), None) => Ok(url),
        (None, Some(path)) => Ok(path.display().to_string()),
        (None, None) => Ok(".".to_string()),
        (Some(_), Some(_)) => Err("specify either --repo-url or --path, not both".to_string()),
    }
}

fn print_json_or<T: serde::Serialize>(json: bool, value: &T, human: impl FnOnce()) {
    if json {
        println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
    } else {
        human();
    }
}

fn fail(err: impl std::fmt::Display) -> ! {
    eprintln!("error: {err}");
    std::process::exit(1);
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("contextinator_core=info".parse().unwrap())
                .add_directive("contextinator_cli=info".parse().unwrap()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let config = Config::from_env(std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))).unwrap_or_else(|e| fail(e));

    if let Err(err) = run(cli, config).await {
        fail(err);
    }
}

async fn run(cli: Cli, config: Config) -> Result<(), ContextinatorError> {
    match cli.command {
        Commands::Chunk { repo_url, path, chunks_dir, save } => {
            let source = resolve_repo_source(repo_url, path).unwrap_or_else(|e| fail(e));
            let opts = IngestOptions::default();
            let (chunks, stats) = chunk_repo(&source, &config, &opts).await?;

            if save {
                let repo_name = repo_display_name(&source);
                let dir = chunks_dir.unwrap_or_else(|| config.chunks_dir(&sanitize_collection_name(&repo_name)));
                write_chunks_manifest(&dir.join("chunks.json"), &chunks, &stats, &repo_name)?;
            }

            print_json_or(
                cli.json,
                &serde_json::json!({"chunks": chunks.len(), "files_ok": stats.files_ok, "files_failed": stats.files_failed, "duplicates": stats.duplicates, "split_chunks": stats.split_chunks}),
                || {
                    println!("chunked {} files ({} failed)", stats.files_ok, stats.files_failed);
                    println!("{} unique chunks, {} duplicates, {} split", chunks.len(), stats.duplicates, stats.split_chunks);
                },
            );
            Ok(())
        }

        Commands::Embed { chunks_dir, embeddings_dir, save } => {
            let manifest = read_chunks_manifest(&chunks_dir.join("chunks.json"))?;
            let api_key = config.require_api_key()?.to_string();
            let client = embedding::EmbeddingClient::new(api_key, config.openai_embedding_model.clone());
            let embedded = embedding::embed_async(
                &client,
                &manifest.chunks,
                config.openai_max_tokens,
                config.embedding_batch_size,
                5,
            )
            .await?;

            if save {
                let dir = embeddings_dir.unwrap_or_else(|| config.embeddings_dir(&sanitize_collection_name(&manifest.repository)));
                write_embeddings_manifest(&dir.join("embeddings.json"), &embedded, &config.openai_embedding_model, &manifest.repository)?;
            }

            print_json_or(cli.json, &serde_json::json!({"embedded": embedded.len()}), || {
                println!("embedded {} chunks", embedded.len());
            });
            Ok(())
        }

        Commands::StoreEmbeddings { embeddings_dir, collection, clear_existing } => {
            let manifest = read_embeddings_manifest(&embeddings_dir.join("embeddings.json"))?;
            let safe_name = sanitize_collection_name(&collection);
            let store = VectorStore::connect(
                config.use_chroma_server,
                &config.chroma_server_url,
                config.chroma_server_auth_token.as_deref(),
                config.chromadb_dir(&safe_name),
            )
            .await;
            let stats = store
                .store_embeddings(&manifest.embeddings, &collection, config.chroma_batch_size, clear_existing)
                .await?;

            print_json_or(cli.json, &serde_json::json!({"stored": stats.stored_count, "failed_batches": stats.failed_batches}), || {
                println!("stored {} embeddings ({} batches failed)", stats.stored_count, stats.failed_batches);
            });
            Ok(())
        }

        Commands::ChunkEmbedStoreEmbeddings { repo_url, path, collection, clear_existing } => {
            let source = resolve_repo_source(repo_url, path).unwrap_or_else(|e| fail(e));
            let collection = collection.unwrap_or_else(|| repo_display_name(&source));
            let mut opts = IngestOptions::default();
            opts.clear_existing = clear_existing;

            let report = process_repo(&source, &collection, &config, &opts).await?;
            print_json_or(
                cli.json,
                &serde_json::json!({
                    "collection": report.collection_name,
                    "files_ok": report.stats.files_ok,
                    "files_failed": report.stats.files_failed,
                    "unique_chunks": report.stats.unique_chunks,
                    "stored": report.stored_count,
                }),
                || {
                    println!("ingested '{}' into collection '{}'", report.repository, report.collection_name);
                    println!("{} files ok, {} failed, {} stored", report.stats.files_ok, report.stats.files_failed, report.stored_count);
                },
            );
            Ok(())
        }

        Commands::Structure { path, max_depth } => {
            let tree = repo_structure(&path, max_depth);
            print_json_or(cli.json, &tree, || print_tree(&tree, 0));
            Ok(())
        }

        Commands::Search { collection, query, top_n, language } => {
            let api_key = config.require_api_key()?.to_string();
            let client = embedding::EmbeddingClient::new(api_key, config.openai_embedding_model.clone());
            let safe_name = sanitize_collection_name(&collection);
            let store = connect_store(&config, &safe_name).await;

            let filters = SemanticFilters { language, ..Default::default() };
            let hits = semantic_search(&store, &client, &collection, &query, top_n, &filters).await?;

            print_json_or(cli.json, &hits, || {
                for hit in &hits {
                    println!("{:.3}  {}  ({})", hit.similarity, hit.file_path, hit.node_name);
                }
            });
            Ok(())
        }

        Commands::SearchAdvanced { collection, query, top_n, language, file_path_contains, node_type, exclude_parents } => {
            let api_key = config.require_api_key()?.to_string();
            let client = embedding::EmbeddingClient::new(api_key, config.openai_embedding_model.clone());
            let safe_name = sanitize_collection_name(&collection);
            let store = connect_store(&config, &safe_name).await;

            let filters = SemanticFilters { language, file_path_contains, node_type, exclude_parents };
            let hits = semantic_search(&store, &client, &collection, &query, top_n, &filters).await?;

            print_json_or(cli.json, &hits, || {
                for hit in &hits {
                    println!("{:.3}  {}  ({})", hit.similarity, hit.file_path, hit.node_name);
                }
            });
            Ok(())
        }

        Commands::Symbol { collection, name, symbol_type, language, exact } => {
            let safe_name = sanitize_collection_name(&collection);
            let store = connect_store(&config, &safe_name).await;
            let hits = symbol_search(&store, &collection, &name, symbol_type.as_deref(), language.as_deref(), exact).await?;

            print_json_or(cli.json, &hits, || {
                for hit in &hits {
                    println!("{}  {}  ({})", hit.node_name, hit.file_path, hit.node_type);
                }
            });
            Ok(())
        }

        Commands::Pattern { collection, pattern, regex, case_sensitive, whole_word, context_lines, max_chunks } => {
            let safe_name = sanitize_collection_name(&collection);
            let store = connect_store(&config, &safe_name).await;

            if regex {
                let points = store.get(&collection, None).await?;
                let hits = regex_search(&points, &pattern, case_sensitive, None, max_chunks)?;
                print_json_or(cli.json, &hits, || {
                    for hit in &hits {
                        println!("{}  ({} matches)", hit.file_path, hit.match_spans.len());
                    }
                });
            } else {
                let result = grep_search(&store, &collection, &pattern, max_chunks, case_sensitive, whole_word, context_lines, None).await?;
                print_json_or(cli.json, &result, || {
                    for file in &result.files {
                        println!("{} ({} matches)", file.path, file.match_count);
                        for m in &file.matches {
                            println!("  {}: {}", m.line_number, m.content);
                        }
                    }
                    println!("\n{} matches in {} files", result.total_matches, result.total_files);
                });
            }
            Ok(())
        }

        Commands::ReadFile { collection, file_path, node_type } => {
            let safe_name = sanitize_collection_name(&collection);
            let store = connect_store(&config, &safe_name).await;
            let result = search_read_file(&store, &collection, &file_path, node_type.as_deref(), true).await?;

            print_json_or(cli.json, &result, || {
                if let Some(content) = &result.content {
                    println!("{content}");
                } else {
                    println!("no chunks found for '{file_path}'");
                }
            });
            Ok(())
        }

        Commands::DbInfo { collection } => {
            let safe_name = sanitize_collection_name(&collection);
            let store = connect_store(&config, &safe_name).await;
            let info: types::CollectionRecord = store.collection_info(&collection).await?;
            print_json_or(cli.json, &info, || println!("{}: {} points", info.name, info.count));
            Ok(())
        }

        Commands::DbList => {
            let safe_name = sanitize_collection_name("default_collection");
            let store = connect_store(&config, &safe_name).await;
            let collections = store.list_collections().await?;
            print_json_or(cli.json, &collections, || {
                for c in &collections {
                    println!("{}  ({} points)", c.name, c.count);
                }
            });
            Ok(())
        }

        Commands::DbShow { collection, limit } => {
            let safe_name = sanitize_collection_name(&collection);
            let store = connect_store(&config, &safe_name).await;
            let mut points = store.get(&collection, None).await?;
            points.truncate(limit);
            print_json_or(cli.json, &points, || {
                for p in &points {
                    println!("{}  {:?}", p.id, p.metadata);
                }
            });
            Ok(())
        }

        Commands::DbClear { collection } => {
            let safe_name = sanitize_collection_name(&collection);
            let store = connect_store(&config, &safe_name).await;
            store.delete_collection(&collection).await?;
            println!("deleted collection '{safe_name}'");
            Ok(())
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
    }
}

async fn connect_store(config: &Config, safe_collection_name: &str) -> VectorStore {
    VectorStore::connect(
        config.use_chroma_server,
        &config.chroma_server_url,
        config.chroma_server_auth_token.as_deref(),
        config.chromadb_dir(safe_collection_name),
    )
    .await
}

fn repo_display_name(source: &str) -> String {
    PathBuf::from(source.trim_end_matches(".git").trim_end_matches('/'))
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("repository")
        .to_string()
}

fn print_tree(node: &contextinator_core::search::StructureNode, depth: usize) {
    println!("{}{}{}", "  ".repeat(depth), node.name, if node.is_dir { "/" } else { "" });
    for child in &node.children {
        print_tree(child, depth + 1);
    }
}
