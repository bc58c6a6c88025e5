//! Testing utilities and fixtures
//!
//! Temp-dir helpers, sample documents and test doubles shared by the unit
//! tests, the integration tests and the benchmarks.

pub mod mocks;

pub use mocks::{MockUserInteraction, RecordingReload, ScriptedEngine};

use anyhow::Result;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

/// A minimal web.config with the sections the sample transform touches
pub const SAMPLE_WEB_CONFIG: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<configuration>
  <appSettings>
    <add key="Environment" value="Development" />
    <add key="FeatureFlag" value="false" />
  </appSettings>
  <connectionStrings>
    <add name="Main" connectionString="Server=localhost;Database=App" providerName="System.Data.SqlClient" />
  </connectionStrings>
  <system.web>
    <compilation debug="true" targetFramework="4.8" />
  </system.web>
</configuration>
"#;

/// An environment transform for [`SAMPLE_WEB_CONFIG`]
pub const SAMPLE_TRANSFORM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<configuration xmlns:xdt="http://schemas.microsoft.com/XML-Document-Transform">
  <appSettings>
    <add key="Environment" value="Staging" xdt:Transform="SetAttributes" xdt:Locator="Match(key)" />
    <add key="CacheSeconds" value="300" xdt:Transform="Insert" />
  </appSettings>
  <connectionStrings>
    <add name="Main" connectionString="Server=staging-db;Database=App" xdt:Transform="SetAttributes(connectionString)" xdt:Locator="Match(name)" />
  </connectionStrings>
  <system.web>
    <compilation xdt:Transform="RemoveAttributes(debug)" />
  </system.web>
</configuration>
"#;

/// A transform whose directives match nothing in [`SAMPLE_WEB_CONFIG`]
pub const NON_MATCHING_TRANSFORM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<configuration xmlns:xdt="http://schemas.microsoft.com/XML-Document-Transform">
  <appSettings>
    <add key="DoesNotExist" value="x" xdt:Transform="SetAttributes" xdt:Locator="Match(key)" />
  </appSettings>
</configuration>
"#;

/// Temporary directory that lives as long as the test
pub struct TestContext {
    pub temp_dir: TempDir,
}

impl TestContext {
    pub fn new() -> Result<Self> {
        Ok(Self {
            temp_dir: TempDir::new()?,
        })
    }

    /// Get the path to the temporary directory
    pub fn temp_path(&self) -> PathBuf {
        self.temp_dir.path().to_path_buf()
    }

    /// Create a test file in the temporary directory
    pub fn create_test_file(&self, name: &str, content: &str) -> Result<PathBuf> {
        let file_path = self.temp_dir.path().join(name);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&file_path, content)?;
        Ok(file_path)
    }

    pub fn read_file(&self, name: &str) -> Result<String> {
        Ok(fs::read_to_string(self.temp_dir.path().join(name))?)
    }

    /// Lay out `web.config` plus a named transform next to it
    pub fn with_sample_pair(&self, transform_name: &str) -> Result<(PathBuf, PathBuf)> {
        let base = self.create_test_file("web.config", SAMPLE_WEB_CONFIG)?;
        let transform = self.create_test_file(transform_name, SAMPLE_TRANSFORM)?;
        Ok((base, transform))
    }
}
