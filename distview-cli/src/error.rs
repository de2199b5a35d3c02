use distview::list::ListError;
use distview::mount::MountError;
use distview::reference::NameError;
use distview::store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DistviewCliError {
    #[error("could not get a name: {0}")]
    Name(#[from] NameError),

    #[error("could not open the local registry: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    List(#[from] ListError),

    #[error("{0}")]
    Mount(#[from] MountError),

    #[error("{0} item(s) failed, see the warnings above")]
    Partial(usize),
}

pub type Result<T> = std::result::Result<T, DistviewCliError>;
