pub mod uniswap_v3_pool_swap;
