/// How local override settings are combined with the config JSON downloaded from the CDN.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OverrideBehavior {
    /// Only the local settings are used. Nothing is ever downloaded.
    LocalOnly,
    /// Downloaded and local settings are merged, the local one wins on a key collision.
    LocalOverRemote,
    /// Downloaded and local settings are merged, the downloaded one wins on a key collision.
    RemoteOverLocal,
}
